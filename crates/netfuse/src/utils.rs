use crate::error;

pub type Result<T> = ::std::result::Result<T, error::Error>;

#[macro_export]
macro_rules! io_err {
    ($kind:ident, $msg:expr) => {
        ::std::io::Error::new(::std::io::ErrorKind::$kind, $msg)
    };
}

#[macro_export]
macro_rules! res {
    ($err:expr) => {
        Err(From::from($err))
    };
}

pub fn parse_proto(arg: &str) -> Option<(&str, String)> {
    let mut split = arg.split('!');
    let (proto, addr) = (split.next()?, split.next()?);

    match proto {
        "tcp" => {
            let port = split.next()?;
            Some((proto, format!("{addr}:{port}")))
        }
        _ => Some((proto, addr.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_proto_tcp() {
        assert_eq!(
            parse_proto("tcp!0.0.0.0!5564"),
            Some(("tcp", "0.0.0.0:5564".to_owned()))
        );
    }

    #[test]
    fn parse_proto_unix() {
        assert_eq!(
            parse_proto("unix!/tmp/netfuse.sock!0"),
            Some(("unix", "/tmp/netfuse.sock".to_owned()))
        );
    }

    #[test]
    fn parse_proto_invalid() {
        assert_eq!(parse_proto("garbage"), None);
    }
}
