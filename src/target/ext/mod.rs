//! Extensions to [`Target`](super::Target) which add support for optional
//! functionality.
//!
//! Each extension is an _Inlineable Dyn Extension Trait_ (IDET): a trait with
//! `Target` as a supertrait, paired with a `<Ext>Ops` type alias. The server
//! asks for an extension through the matching `Target::support_<ext>` method,
//! and falls back to its built-in behavior when the target returns `None`.

macro_rules! define_ext {
    ($extname:ident, $exttrait:ident) => {
        #[doc = concat!("See [`", stringify!($exttrait), "`].")]
        pub type $extname<'a> = &'a mut dyn $exttrait;
    };
}

pub mod memory_regions;
pub mod monitor_cmd;
pub mod section_offsets;
pub mod thread_extra_info;
