use num_traits::PrimInt;

/// Describes where a single register lives inside a [`RegisterContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMapEntry {
    /// Register name, as used in the target description.
    pub name: &'static str,
    /// Byte offset within the context.
    pub offset: usize,
    /// Size in bytes.
    pub size: usize,
    /// Target-description feature this register belongs to.
    pub feature: Option<&'static str>,
    /// Target-description type tag (e.g: `code_ptr`, `i387_ext`).
    pub kind: Option<&'static str>,
}

impl RegisterMapEntry {
    /// Size in bits, as reported in the target description.
    pub fn bitsize(&self) -> usize {
        self.size * 8
    }
}

/// Build a register map at compile time.
///
/// Every register is packed directly after the previous one. Entries are
/// `name: size` with an optional `=> "type"` tag, grouped by feature.
macro_rules! register_map {
    (@kind) => { None };
    (@kind $kind:literal) => { Some($kind) };
    (@count) => { 0usize };
    (@count $head:literal $($tail:literal)*) => { 1usize + register_map!(@count $($tail)*) };
    ($(feature $feature:literal { $($name:literal: $size:literal $(=> $kind:literal)?,)* })*) => {{
        const fn build() -> [crate::context::RegisterMapEntry; register_map!(@count $($($name)*)*)] {
            let mut map = [crate::context::RegisterMapEntry {
                name: "",
                offset: 0,
                size: 0,
                feature: None,
                kind: None,
            }; register_map!(@count $($($name)*)*)];
            let mut idx = 0;
            let mut offset = 0;
            $($(
                map[idx] = crate::context::RegisterMapEntry {
                    name: $name,
                    offset,
                    size: $size,
                    feature: Some($feature),
                    kind: register_map!(@kind $($kind)?),
                };
                idx += 1;
                offset += $size;
            )*)*
            let _ = (idx, offset);
            map
        }
        build()
    }};
}

/// Total size in bytes of a register map.
pub(crate) const fn map_size(map: &[RegisterMapEntry]) -> usize {
    if map.is_empty() {
        return 0;
    }
    let last = &map[map.len() - 1];
    last.offset + last.size
}

/// The register state of a single thread.
///
/// The context is an opaque byte image whose layout is defined by a backend's
/// register map. Registers are stored in target byte order, so the `g` packet
/// is simply a hex dump of the leading `map_size` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterContext {
    bytes: Vec<u8>,
    big_endian: bool,
}

impl RegisterContext {
    /// Create a zeroed context of `size` bytes.
    pub fn new(size: usize, big_endian: bool) -> RegisterContext {
        RegisterContext {
            bytes: vec![0; size],
            big_endian,
        }
    }

    /// Wrap an existing byte image.
    pub fn from_bytes(bytes: Vec<u8>, big_endian: bool) -> RegisterContext {
        RegisterContext { bytes, big_endian }
    }

    /// Whether multi-byte registers are stored big-endian.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Size of the context in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the context holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw byte image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw byte image.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Bytes backing a register map entry.
    pub fn register(&self, entry: &RegisterMapEntry) -> Option<&[u8]> {
        self.bytes.get(entry.offset..entry.offset + entry.size)
    }

    /// Mutable bytes backing a register map entry.
    pub fn register_mut(&mut self, entry: &RegisterMapEntry) -> Option<&mut [u8]> {
        self.bytes.get_mut(entry.offset..entry.offset + entry.size)
    }

    /// Read an unsigned integer of `size` bytes (at most 8) at `offset`.
    pub fn read_uint(&self, offset: usize, size: usize) -> Option<u64> {
        if size > 8 {
            return None;
        }
        let raw = self.bytes.get(offset..offset + size)?;
        let mut val = 0u64;
        if self.big_endian {
            for b in raw {
                val = (val << 8) | *b as u64;
            }
        } else {
            for b in raw.iter().rev() {
                val = (val << 8) | *b as u64;
            }
        }
        Some(val)
    }

    /// Write the low `size` bytes (at most 8) of `val` at `offset`.
    pub fn write_uint(&mut self, offset: usize, size: usize, val: u64) -> Option<()> {
        if size > 8 {
            return None;
        }
        let big_endian = self.big_endian;
        let raw = self.bytes.get_mut(offset..offset + size)?;
        for (i, b) in raw.iter_mut().enumerate() {
            let shift = if big_endian { size - 1 - i } else { i };
            *b = (val >> (shift * 8)) as u8;
        }
        Some(())
    }

    /// Typed read, sized by `I`.
    pub fn get<I: PrimInt>(&self, offset: usize) -> Option<I> {
        let raw = self.read_uint(offset, core::mem::size_of::<I>())?;
        I::from(raw)
    }

    /// Typed write, sized by `I`.
    pub fn set<I: PrimInt>(&mut self, offset: usize, val: I) -> Option<()> {
        let size = core::mem::size_of::<I>();
        // sign bits beyond `size` are truncated by `write_uint`
        let raw = match val.to_u64() {
            Some(v) => v,
            None => val.to_i64()? as u64,
        };
        self.write_uint(offset, size, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_access() {
        let mut ctx = RegisterContext::new(8, false);
        ctx.write_uint(0, 4, 0xdead_beef).unwrap();
        assert_eq!(&ctx.as_bytes()[..4], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(ctx.read_uint(0, 4), Some(0xdead_beef));
        assert_eq!(ctx.get::<u16>(2), Some(0xdead));
    }

    #[test]
    fn big_endian_access() {
        let mut ctx = RegisterContext::new(8, true);
        ctx.set::<u32>(4, 0x7d82_1008).unwrap();
        assert_eq!(&ctx.as_bytes()[4..], &[0x7d, 0x82, 0x10, 0x08]);
        assert_eq!(ctx.get::<u32>(4), Some(0x7d82_1008));
    }

    #[test]
    fn out_of_range_is_none() {
        let mut ctx = RegisterContext::new(4, false);
        assert_eq!(ctx.read_uint(2, 4), None);
        assert_eq!(ctx.write_uint(0, 9, 0), None);
        assert_eq!(ctx.get::<u64>(0), None);
    }

    #[test]
    fn map_macro_packs_registers() {
        const MAP: [RegisterMapEntry; 3] = register_map! {
            feature "core" {
                "a": 4,
                "b": 8 => "code_ptr",
            }
            feature "fpu" {
                "c": 10 => "i387_ext",
            }
        };
        assert_eq!(MAP[1].offset, 4);
        assert_eq!(MAP[1].kind, Some("code_ptr"));
        assert_eq!(MAP[2].offset, 12);
        assert_eq!(MAP[2].feature, Some("fpu"));
        assert_eq!(map_size(&MAP), 22);
    }
}
