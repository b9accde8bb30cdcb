use std::{fmt::Display, str::FromStr};

use crate::error::Error;

/// One `external[:internal]` command line token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub external: u16,
    pub internal: u16,
}

/// Decimal digits with an optional leading `+`.
fn parse_port(s: &str, kind: &'static str) -> Result<u16, Error> {
    let digits = s.strip_prefix('+').unwrap_or(s);
    match digits.parse::<u16>() {
        Ok(port) if port > 0 && digits.bytes().all(|b| b.is_ascii_digit()) => Ok(port),
        _ => Err(Error::InvalidPort {
            kind,
            value: s.to_owned(),
        }),
    }
}

impl FromStr for PortMapping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => {
                let port = parse_port(s, "port")?;
                Ok(PortMapping {
                    external: port,
                    internal: port,
                })
            }
            Some((external, internal)) => Ok(PortMapping {
                external: parse_port(external, "external port")?,
                internal: parse_port(internal, "internal port")?,
            }),
        }
    }
}

impl Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.external, self.internal)
    }
}

/// Parses a `rem` token. Only the external port identifies a mapping, so pairs are refused
/// unless both halves agree.
pub fn parse_external_port(s: &str) -> Result<u16, Error> {
    let mapping: PortMapping = s.parse()?;
    if mapping.external != mapping.internal {
        return Err(Error::Usage(
            "When removing ports, only specify the external port".into(),
        ));
    }
    Ok(mapping.external)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(external: u16, internal: u16) -> PortMapping {
        PortMapping { external, internal }
    }

    #[test]
    fn test_single_port() {
        for p in [1u16, 80, 3000, 65535] {
            assert_eq!(p.to_string().parse::<PortMapping>().unwrap(), m(p, p));
        }
    }

    #[test]
    fn test_pair() {
        assert_eq!("5000:6000".parse::<PortMapping>().unwrap(), m(5000, 6000));
        assert_eq!("1:65535".parse::<PortMapping>().unwrap(), m(1, 65535));
    }

    #[test]
    fn test_leading_plus() {
        assert_eq!("+80".parse::<PortMapping>().unwrap(), m(80, 80));
        assert_eq!("+5000:+6000".parse::<PortMapping>().unwrap(), m(5000, 6000));
    }

    #[test]
    fn test_invalid_ports() {
        for s in [
            "", "0", "65536", "-1", "+", "++80", "+-80", "abc", "80a", " 80", "0:80", "80:0",
            "80:65536", "80:", ":80", "80:90:100", "99999999999",
        ] {
            let err = s.parse::<PortMapping>().unwrap_err();
            assert!(matches!(err, Error::InvalidPort { .. }), "{s:?} gave {err:?}");
        }
    }

    #[test]
    fn test_error_names_the_bad_segment() {
        assert_eq!(
            "x".parse::<PortMapping>().unwrap_err().to_string(),
            "Invalid port 'x'"
        );
        assert_eq!(
            "x:80".parse::<PortMapping>().unwrap_err().to_string(),
            "Invalid external port 'x'"
        );
        assert_eq!(
            "80:70000".parse::<PortMapping>().unwrap_err().to_string(),
            "Invalid internal port '70000'"
        );
    }

    #[test]
    fn test_external_port_for_removal() {
        assert_eq!(parse_external_port("3000").unwrap(), 3000);
        assert_eq!(parse_external_port("3000:3000").unwrap(), 3000);
        assert!(matches!(
            parse_external_port("3000:4000"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            parse_external_port("0"),
            Err(Error::InvalidPort { .. })
        ));
    }
}
