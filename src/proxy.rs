use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use anyhow::Context;
use nom::branch::alt;
use nom::bytes::complete::{is_not, take_till};
use nom::character::complete::char;
use nom::combinator::{opt, rest};
use nom::sequence::{delimited, preceded};
use nom::IResult;

/// The SOCKS5 proxy that all tunneled traffic is sent to.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl ProxyEndpoint {
    /// Port used when none is given, or when the given one cannot be parsed.
    pub const DEFAULT_PORT: u16 = 1080;

    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port: port.filter(|p| *p != 0).unwrap_or(Self::DEFAULT_PORT),
            username: None,
            password: None,
        }
    }

    /// Attaches credentials. Blank values are treated as absent.
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.trim().is_empty());
        self.password = password.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The proxy URL handed to `tun2socks`: `socks5://[user:pass@]host:port`.
    ///
    /// Credentials are only included when both the username and the password are set.
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(username), Some(password)) => format!("{}:{}@", username, password),
            _ => String::new(),
        };
        format!("socks5://{}{}:{}", auth, self.url_host(), self.port)
    }

    /// [`ProxyEndpoint::url`] with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(username), Some(_)) => {
                format!("socks5://{}:***@{}:{}", username, self.url_host(), self.port)
            }
            _ => self.url(),
        }
    }

    fn url_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl Display for ProxyEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.username {
            Some(username) => write!(f, "{}@{}:{}", username, self.url_host(), self.port),
            None => write!(f, "{}:{}", self.url_host(), self.port),
        }
    }
}

impl Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Parses the compact `host[:port[:username[:password]]]` notation.
///
/// IPv6 hosts must be bracketed (`[::1]:1080`). The password is everything after the third
/// colon, so it may itself contain colons.
impl FromStr for ProxyEndpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("socks5://").unwrap_or(s);
        let (remaining, (host, port, username, password)) = compact_proxy(s)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid proxy specification: {}", s))?;

        anyhow::ensure!(
            remaining.is_empty(),
            "Unexpected trailing input in proxy specification: {}",
            remaining
        );
        anyhow::ensure!(!host.trim().is_empty(), "Proxy host must not be empty");

        let port = match port.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => match p.parse::<u16>() {
                Ok(port) if port != 0 => Some(port),
                _ => {
                    warn!(
                        "Invalid proxy port '{}', using default: {}",
                        p,
                        Self::DEFAULT_PORT
                    );
                    None
                }
            },
            None => None,
        };

        Ok(Self::new(host.trim(), port)
            .with_credentials(username.map(String::from), password.map(String::from)))
    }
}

type CompactProxy<'a> = (&'a str, Option<&'a str>, Option<&'a str>, Option<&'a str>);

fn compact_proxy(input: &str) -> IResult<&str, CompactProxy<'_>> {
    let (input, host) = proxy_host(input)?;
    let (input, port) = opt(field)(input)?;
    let (input, username) = opt(field)(input)?;
    let (input, password) = opt(preceded(char(':'), rest))(input)?;
    Ok((input, (host, port, username, password)))
}

fn proxy_host(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('['), is_not("]"), char(']')),
        take_till(|c: char| c == ':'),
    ))(input)
}

fn field(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_till(|c: char| c == ':'))(input)
}
