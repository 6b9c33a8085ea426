use super::prelude::*;

#[derive(Debug)]
pub struct qSupported<'a> {
    pub features: Features<'a>,
}

impl<'a> ParseCommand<'a> for qSupported<'a> {
    fn from_packet(buf: PacketBuf<'a>) -> Option<Self> {
        let body = buf.into_body_str();
        let features = match body {
            "" => "",
            body => body.strip_prefix(':')?,
        };

        Some(qSupported {
            features: Features(features),
        })
    }
}

#[derive(Debug)]
pub struct Features<'a>(&'a str);

impl<'a> Features<'a> {
    pub fn into_iter(self) -> impl Iterator<Item = Feature<'a>> + 'a {
        self.0.split(';').filter(|s| !s.is_empty()).map(|s| {
            match s.as_bytes()[s.len() - 1] {
                c @ (b'+' | b'-' | b'?') => Feature {
                    name: &s[..s.len() - 1],
                    val: None,
                    supported: c == b'+',
                },
                _ => {
                    let mut parts = s.splitn(2, '=');
                    Feature {
                        name: parts.next().unwrap_or_default(),
                        val: parts.next(),
                        supported: true,
                    }
                }
            }
        })
    }
}

#[derive(PartialEq, Eq, Debug)]
pub struct Feature<'a> {
    pub name: &'a str,
    pub val: Option<&'a str>,
    pub supported: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_features() {
        let mut body = b":multiprocess+;swbreak+;xmlRegisters=i386;fork-events-".to_vec();
        let cmd = qSupported::from_packet(PacketBuf::new_with_raw_body(&mut body).unwrap())
            .unwrap();
        let features: Vec<_> = cmd.features.into_iter().collect();
        assert_eq!(features.len(), 4);
        assert_eq!(features[2].name, "xmlRegisters");
        assert_eq!(features[2].val, Some("i386"));
        assert!(!features[3].supported);
    }
}
