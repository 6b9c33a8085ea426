use core::convert::{TryFrom, TryInto};
use core::num::NonZeroUsize;

use super::hex::decode_hex;

/// Tid/Pid Selector.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum IdKind {
    /// All threads (-1)
    All,
    /// Any thread (0)
    Any,
    /// Thread with specific ID (id > 0)
    WithId(NonZeroUsize),
}

impl IdKind {
    /// The specific id, if any.
    pub fn specific(self) -> Option<NonZeroUsize> {
        match self {
            IdKind::WithId(id) => Some(id),
            _ => None,
        }
    }
}

/// Unique Thread ID.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ThreadId {
    /// Process ID (may or may not be present).
    pub pid: Option<IdKind>,
    /// Thread ID.
    pub tid: IdKind,
}

impl TryFrom<&[u8]> for ThreadId {
    type Error = ();

    fn try_from(s: &[u8]) -> Result<Self, ()> {
        match s {
            [b'p', s @ ..] => {
                // p<pid>.<tid>
                let mut s = s.split(|b| *b == b'.');
                let pid: IdKind = s.next().ok_or(())?.try_into()?;
                let tid: IdKind = match s.next() {
                    Some(s) => s.try_into()?,
                    None => IdKind::All,
                };

                Ok(ThreadId {
                    pid: Some(pid),
                    tid,
                })
            }
            _ => Ok(ThreadId {
                pid: None,
                tid: s.try_into()?,
            }),
        }
    }
}

impl TryFrom<&[u8]> for IdKind {
    type Error = ();

    fn try_from(s: &[u8]) -> Result<Self, ()> {
        Ok(match s {
            b"-1" => IdKind::All,
            b"0" => IdKind::Any,
            id => IdKind::WithId(NonZeroUsize::new(decode_hex(id).map_err(drop)?).ok_or(())?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_thread_ids() {
        let tid = ThreadId::try_from(&b"1a"[..]).unwrap();
        assert_eq!(tid.tid, IdKind::WithId(NonZeroUsize::new(0x1a).unwrap()));
        assert_eq!(tid.pid, None);

        let tid = ThreadId::try_from(&b"p10.-1"[..]).unwrap();
        assert_eq!(tid.pid, Some(IdKind::WithId(NonZeroUsize::new(0x10).unwrap())));
        assert_eq!(tid.tid, IdKind::All);

        assert_eq!(ThreadId::try_from(&b"0"[..]).unwrap().tid, IdKind::Any);
        assert!(ThreadId::try_from(&b"zz"[..]).is_err());
    }
}
