use std::{io, time::Duration};

use http_body_util::{BodyExt, Collected, Full};
use hyper::body::Bytes;
use hyper::{
    header::{HeaderValue, AUTHORIZATION},
    Method, Request, Uri,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::runtime::{self, Runtime};

/// An InfluxDB HTTP write endpoint, parsed from a connection string.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HttpEndpoint {
    pub write_uri: Uri,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl HttpEndpoint {
    /// Parses the part of a connection string following `<scheme>://`.
    ///
    /// The expected shape is `[user[:password]@]host[:port]/<database>`.
    pub fn parse(scheme: &str, rest: &str) -> Result<Self, String> {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));

        let database = path.trim_matches('/');
        if database.is_empty() {
            return Err("missing database name in connection string path".to_string());
        }
        if database.contains(|c: char| matches!(c, '/' | '?' | '#' | '&' | '=' | ' ')) {
            return Err(format!("invalid database name '{database}'"));
        }

        let (userinfo, host) = match authority.rsplit_once('@') {
            Some((userinfo, host)) => (Some(userinfo), host),
            None => (None, authority),
        };
        if host.is_empty() {
            return Err("missing host in connection string".to_string());
        }

        let (username, password) = match userinfo {
            Some(userinfo) => match userinfo.split_once(':') {
                Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
                None => (Some(userinfo.to_string()), None),
            },
            None => (None, None),
        };

        let write_uri = Uri::try_from(format!("{scheme}://{host}/write?db={database}"))
            .map_err(|e| e.to_string())?;

        Ok(HttpEndpoint { write_uri, username, password })
    }
}

/// A blocking HTTP client for the forwarder thread.
///
/// Requests are driven on a current-thread runtime owned by the client, so the forwarder can stay a
/// plain OS thread like the UDP transport.
pub(crate) struct HttpClient {
    runtime: Runtime,
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    write_uri: Uri,
    auth: Option<HeaderValue>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(endpoint: &HttpEndpoint, timeout: Duration) -> io::Result<Self> {
        let runtime = runtime::Builder::new_current_thread().enable_all().build()?;

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(https);

        let auth = endpoint
            .username
            .as_ref()
            .map(|name| basic_auth(name, endpoint.password.as_deref()));

        Ok(HttpClient { runtime, client, write_uri: endpoint.write_uri.clone(), auth, timeout })
    }

    pub fn send(&self, payload: &[u8]) -> io::Result<usize> {
        let mut builder = Request::builder().method(Method::POST).uri(self.write_uri.clone());
        if let Some(auth) = &self.auth {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }

        let request = builder
            .body(Full::new(Bytes::copy_from_slice(payload)))
            .map_err(io::Error::other)?;

        self.runtime.block_on(async {
            let response = tokio::time::timeout(self.timeout, self.client.request(request))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write request timed out"))?
                .map_err(io::Error::other)?;

            if response.status().is_success() {
                return Ok(payload.len());
            }

            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map(Collected::to_bytes)
                .map_err(|_| ())
                .and_then(|b| String::from_utf8(b[..].to_vec()).map_err(|_| ()))
                .unwrap_or_else(|()| String::from("<failed to read response body>"));

            Err(io::Error::other(format!("unexpected status {status} from write endpoint: {body}")))
        })
    }
}

fn basic_auth(username: &str, password: Option<&str>) -> HeaderValue {
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        write!(encoder, "{username}:").expect("should not fail to encode username");
        if let Some(password) = password {
            write!(encoder, "{password}").expect("should not fail to encode password");
        }
    }
    let mut header = HeaderValue::from_bytes(&buf).expect("base64 is always valid HeaderValue");
    header.set_sensitive(true);
    header
}

#[cfg(test)]
mod tests {
    use super::{basic_auth, HttpEndpoint};

    #[test]
    fn parse_endpoint() {
        let endpoint = HttpEndpoint::parse("https", "stats:s3cret@influx.example.com:8086/docker-worker").unwrap();
        assert_eq!(endpoint.write_uri, "https://influx.example.com:8086/write?db=docker-worker");
        assert_eq!(endpoint.username.as_deref(), Some("stats"));
        assert_eq!(endpoint.password.as_deref(), Some("s3cret"));

        let endpoint = HttpEndpoint::parse("http", "localhost:8086/workers/").unwrap();
        assert_eq!(endpoint.write_uri, "http://localhost:8086/write?db=workers");
        assert_eq!(endpoint.username, None);
        assert_eq!(endpoint.password, None);

        let endpoint = HttpEndpoint::parse("http", "reader@localhost/workers").unwrap();
        assert_eq!(endpoint.username.as_deref(), Some("reader"));
        assert_eq!(endpoint.password, None);
    }

    #[test]
    fn parse_endpoint_errors() {
        let cases = ["localhost:8086", "localhost:8086/", "@/db", "localhost/db?precision=s"];
        for case in cases {
            assert!(HttpEndpoint::parse("http", case).is_err(), "expected '{case}' to be rejected");
        }
    }

    #[test]
    fn basic_auth_header() {
        use base64::prelude::BASE64_STANDARD;
        use base64::read::DecoderReader;
        use std::io::Read;

        const BASIC: &str = "Basic ";

        let header = basic_auth("stats", Some("s3cret"));
        let reader = &header.as_ref()[BASIC.len()..];
        let mut decoder = DecoderReader::new(reader, &BASE64_STANDARD);
        let mut result = Vec::new();
        decoder.read_to_end(&mut result).unwrap();
        assert_eq!(b"stats:s3cret", &result[..]);
        assert!(header.is_sensitive());
    }
}
