use paste::paste;

use crate::protocol::packet::PacketBuf;

/// Common imports used by >50% of all packet parsing code.
///
/// Do not clutter this prelude with types only used by a few packets.
pub mod prelude {
    pub use core::convert::{TryFrom, TryInto};

    pub use crate::protocol::commands::ParseCommand;
    pub use crate::protocol::common::hex::{decode_hex, decode_hex_buf};
    pub use crate::protocol::common::thread_id::{IdKind, ThreadId};
    pub use crate::protocol::packet::PacketBuf;
}

pub trait ParseCommand<'a>: Sized {
    /// Try to parse a packet from the packet buffer.
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self>;
}

macro_rules! commands {
    (
        $(
            $ext:ident $(use $lt:lifetime)? {
                $($name:literal => $mod:ident::$command:ident$(<$lifetime:lifetime>)?,)*
            }
        )*
    ) => {paste! {
        $($(
            #[allow(non_snake_case, non_camel_case_types)]
            pub mod $mod;
        )*)*

        pub mod ext {
            $(
                #[allow(non_camel_case_types, clippy::enum_variant_names)]
                #[derive(Debug)]
                pub enum [<$ext:camel>] $(<$lt>)? {
                    $($command(super::$mod::$command<$($lifetime)?>),)*
                }
            )*
        }

        /// GDB commands
        #[derive(Debug)]
        pub enum Command<'a> {
            $(
                [<$ext:camel>](ext::[<$ext:camel>]$(<$lt>)?),
            )*
            Unknown(&'a [u8]),
        }

        impl<'a> Command<'a> {
            /// Parse a command packet.
            ///
            /// Returns `None` if the packet names a known command but its
            /// arguments are malformed.
            pub fn from_packet(mut buf: PacketBuf<'a>) -> Option<Command<'a>> {
                // the body must contain at least one byte
                if buf.as_body().is_empty() {
                    return Some(Command::Unknown(&[]));
                }

                $(
                    $(
                        if buf.strip_prefix($name.as_bytes()) {
                            let cmd = $mod::$command::from_packet(buf)?;

                            return Some(
                                Command::[<$ext:camel>](
                                    ext::[<$ext:camel>]::$command(cmd)
                                )
                            )
                        }
                    )*
                )*

                Some(Command::Unknown(buf.into_body()))
            }
        }
    }};
}

commands! {
    base use 'a {
        "?" => question_mark::QuestionMark,
        "D" => _d_upcase::D,
        "g" => _g::g,
        "G" => _g_upcase::G<'a>,
        "H" => _h_upcase::H,
        "k" => _k::k,
        "m" => _m::m,
        "M" => _m_upcase::M<'a>,
        "qAttached" => _qAttached::qAttached,
        "qC" => _qC::qC,
        "qfThreadInfo" => _qfThreadInfo::qfThreadInfo,
        "qGetTIBAddr" => _qGetTIBAddr::qGetTIBAddr,
        "qsThreadInfo" => _qsThreadInfo::qsThreadInfo,
        "qSupported" => _qSupported::qSupported<'a>,
        "qSymbol" => _qSymbol::qSymbol,
        "qTStatus" => _qTStatus::qTStatus,
        "T" => _t_upcase::T,
    }

    resume use 'a {
        "c" => _c::c,
        "C" => _c_upcase::C,
        "s" => _s::s,
        "S" => _s_upcase::S,
        "vCont" => _vCont::vCont<'a>,
    }

    xpoints {
        "z" => _z::z,
        "Z" => _z_upcase::Z,
    }

    single_register_access use 'a {
        "p" => _p::p,
        "P" => _p_upcase::P<'a>,
    }

    no_ack_mode {
        "QStartNoAckMode" => _QStartNoAckMode::QStartNoAckMode,
    }

    monitor_cmd use 'a {
        "qRcmd" => _qRcmd::qRcmd<'a>,
    }

    section_offsets {
        "qOffsets" => _qOffsets::qOffsets,
    }

    thread_extra_info {
        "qThreadExtraInfo" => _qThreadExtraInfo::qThreadExtraInfo,
    }

    qxfer use 'a {
        "qXfer" => _qXfer::qXfer<'a>,
    }
}
