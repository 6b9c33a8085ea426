use super::prelude::*;

#[derive(Debug)]
pub enum vCont<'a> {
    Query,
    Actions(Actions<'a>),
}

impl<'a> ParseCommand<'a> for vCont<'a> {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let body = buf.into_body();
        match body {
            [b'?'] => Some(vCont::Query),
            [b';', ..] => Some(vCont::Actions(Actions(body))),
            _ => None,
        }
    }
}

/// A lazily evaluated iterator over the actions specified in a vCont packet.
#[derive(Debug)]
pub struct Actions<'a>(&'a [u8]);

impl<'a> Actions<'a> {
    /// Yields `None` for every malformed action.
    pub fn iter(&self) -> impl Iterator<Item = Option<VContAction>> + 'a {
        self.0.split(|b| *b == b';').skip(1).map(|act| {
            let mut s = act.splitn(2, |b| *b == b':');
            let kind = s.next()?;
            let thread = match s.next() {
                Some(s) => Some(ThreadId::try_from(s).ok()?),
                None => None,
            };

            Some(VContAction {
                kind: VContKind::from_bytes(kind)?,
                thread,
            })
        })
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct VContAction {
    pub kind: VContKind,
    pub thread: Option<ThreadId>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum VContKind {
    Continue,
    ContinueWithSig(u8),
    RangeStep(u64, u64),
    Step,
    StepWithSig(u8),
    Stop,
}

impl VContKind {
    fn from_bytes(s: &[u8]) -> Option<VContKind> {
        use self::VContKind::*;

        let (kind, rest) = s.split_first()?;
        let res = match kind {
            b'c' if rest.is_empty() => Continue,
            b'C' => ContinueWithSig(decode_hex(rest).ok()?),
            b's' if rest.is_empty() => Step,
            b'S' => StepWithSig(decode_hex(rest).ok()?),
            b't' if rest.is_empty() => Stop,
            b'r' => {
                let mut range = rest.split(|b| *b == b',');
                let start = decode_hex(range.next()?).ok()?;
                let end = decode_hex(range.next()?).ok()?;
                RangeStep(start, end)
            }
            _ => return None,
        };

        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroUsize;

    #[test]
    fn parse_actions() {
        let mut body = b";s:1a;C0b:p2.3;r401000,401010:4;c".to_vec();
        let cmd = vCont::from_packet(PacketBuf::new_with_raw_body(&mut body).unwrap()).unwrap();
        let actions = match cmd {
            vCont::Actions(actions) => actions.iter().collect::<Vec<_>>(),
            vCont::Query => panic!("expected actions"),
        };

        assert_eq!(actions.len(), 4);
        let step = actions[0].unwrap();
        assert_eq!(step.kind, VContKind::Step);
        assert_eq!(
            step.thread.unwrap().tid,
            IdKind::WithId(NonZeroUsize::new(0x1a).unwrap())
        );
        assert_eq!(actions[1].unwrap().kind, VContKind::ContinueWithSig(0xb));
        assert_eq!(
            actions[2].unwrap().kind,
            VContKind::RangeStep(0x401000, 0x401010)
        );
        assert_eq!(actions[3].unwrap().thread, None);
    }

    #[test]
    fn malformed_action() {
        let mut body = b";x".to_vec();
        let cmd = vCont::from_packet(PacketBuf::new_with_raw_body(&mut body).unwrap()).unwrap();
        match cmd {
            vCont::Actions(actions) => assert_eq!(actions.iter().next(), Some(None)),
            vCont::Query => panic!("expected actions"),
        }
    }
}
