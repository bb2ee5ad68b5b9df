//! HTTP transport for XML-RPC calls.

use std::time::{Duration, Instant};

use reqwest::Url;
use reqwest::header::{ACCEPT, ACCEPT_CHARSET, CONNECTION, CONTENT_TYPE};
use tracing::{debug, warn};
use xmlrpc_model::Value;
use xmlrpc_xml::{Decoder, Encoder, Iso8601Options, Zone};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// An XML-RPC client bound to one endpoint.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    url: Url,
    keep_alive: bool,
    encoder: Encoder,
    decoder: Decoder,
}

impl Client {
    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the URL is not an absolute `http` or
    /// `https` URL or the timeout is zero, and `ClientError::Transport` if the
    /// HTTP client cannot be initialised.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let url = Url::parse(&config.url)
            .map_err(|e| ClientError::Config(format!("invalid url '{}': {e}", config.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported url scheme '{}'",
                url.scheme()
            )));
        }
        if config.timeout_secs == 0 {
            return Err(ClientError::Config("timeout must be positive".to_owned()));
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url,
            keep_alive: config.keep_alive,
            encoder: Encoder::default(),
            decoder: Decoder::default(),
        })
    }

    /// Use `zone` for dates sent without an offset and for decoding
    /// offset-less dates in responses.
    #[must_use]
    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.encoder = Encoder::new(Iso8601Options {
            zone,
            ..Iso8601Options::default()
        });
        self.decoder = Decoder::new(zone);
        self
    }

    /// The endpoint this client posts to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Invoke `method` with `params` and return the single result value.
    ///
    /// # Errors
    ///
    /// - `ClientError::Transport` if the request cannot be sent or the body
    ///   cannot be read, including timeouts
    /// - `ClientError::Status` for a non-2xx response
    /// - `ClientError::Rpc` if the call cannot be encoded, the response cannot
    ///   be decoded, or the server returned a fault (see [`ClientError::fault`])
    pub async fn method_call(&self, method: &str, params: &[Value]) -> Result<Value, ClientError> {
        let body = self.encoder.method_call(method, params)?;
        debug!(method, url = %self.url, bytes = body.len(), "sending XML-RPC call");

        let started = Instant::now();
        let mut request = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "text/xml")
            .header(ACCEPT, "text/xml")
            .header(ACCEPT_CHARSET, "UTF8")
            .body(body);
        if self.keep_alive {
            request = request.header(CONNECTION, "Keep-Alive");
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(
            method,
            %status,
            bytes = text.len(),
            elapsed = ?started.elapsed(),
            "received XML-RPC response"
        );

        if !status.is_success() {
            warn!(method, %status, "XML-RPC call rejected by server");
            return Err(ClientError::Status { status, body: text });
        }

        Ok(self.decoder.method_response(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;
    use xmlrpc_model::{Fault, Struct};
    use xmlrpc_xml::{XmlRpcError, decode_method_call, encode_fault, encode_method_response};

    use super::*;

    /// Minimal XML-RPC server: `echo` returns its first param, `headers`
    /// returns the request headers, `fail` answers with a fault, `slow`
    /// sleeps past short timeouts, `garbage` returns non-XML-RPC text.
    async fn handle(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let headers: Value = req
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
            .collect();
        let body = req.into_body().collect().await?.to_bytes();
        let xml = String::from_utf8_lossy(&body).into_owned();

        let (status, reply) = match decode_method_call(&xml) {
            Ok((name, param)) => match name.as_str() {
                "echo" => (StatusCode::OK, encode_method_response(&param)),
                "headers" => (StatusCode::OK, encode_method_response(&headers)),
                "fail" => (StatusCode::OK, encode_fault(&Fault::new("4", "bad"))),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    (StatusCode::OK, encode_method_response(&Value::Nil))
                }
                "garbage" => (StatusCode::OK, Ok("<html>oops</html>".to_owned())),
                _ => (StatusCode::NOT_FOUND, Ok(format!("no method {name}"))),
            },
            Err(e) => (StatusCode::BAD_REQUEST, Ok(e.to_string())),
        };
        let reply = reply.expect("test server encodes reply");

        Ok(Response::builder()
            .status(status)
            .header("content-type", "text/xml")
            .body(Full::new(Bytes::from(reply)))
            .expect("valid response"))
    }

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service_fn(handle))
                        .await;
                });
            }
        });
        addr
    }

    async fn client() -> Client {
        let addr = spawn_server().await;
        Client::new(&ClientConfig::for_url(format!("http://{addr}/RPC2"))).expect("client")
    }

    #[tokio::test]
    async fn test_should_echo_nested_value() {
        let client = client().await;
        let value: Value = [
            ("name", Value::from("widget")),
            ("sizes", Value::Array(vec![Value::Int(1), Value::Double(2.5)])),
            ("blob", Value::Binary(Bytes::from_static(b"\x00\xff"))),
            ("nothing", Value::Nil),
            ("empty", Value::Struct(Struct::new())),
        ]
        .into_iter()
        .collect();

        let result = client
            .method_call("echo", std::slice::from_ref(&value))
            .await
            .expect("call");
        assert_eq!(result, value);
    }

    #[tokio::test]
    async fn test_should_send_protocol_headers() {
        let client = client().await;
        let result = client.method_call("headers", &[]).await.expect("call");

        assert_eq!(result.get("content-type").and_then(Value::as_str), Some("text/xml"));
        assert_eq!(result.get("accept").and_then(Value::as_str), Some("text/xml"));
        assert_eq!(result.get("accept-charset").and_then(Value::as_str), Some("UTF8"));
        assert!(
            result
                .get("user-agent")
                .and_then(Value::as_str)
                .is_some_and(|ua| ua.starts_with("xmlrpc-client/"))
        );
        assert!(
            result
                .get("connection")
                .and_then(Value::as_str)
                .is_some_and(|c| c.eq_ignore_ascii_case("keep-alive"))
        );
        assert!(result.get("content-length").is_some());
    }

    #[tokio::test]
    async fn test_should_surface_fault() {
        let client = client().await;
        let err = client.method_call("fail", &[]).await.expect_err("fault");
        let fault = err.fault().expect("application fault");
        assert_eq!(fault.code, "4");
        assert_eq!(fault.string, "bad");
    }

    #[tokio::test]
    async fn test_should_report_http_status() {
        let client = client().await;
        let err = client.method_call("missing", &[]).await.expect_err("404");
        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert!(body.contains("missing"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_should_report_undecodable_response() {
        let client = client().await;
        let err = client.method_call("garbage", &[]).await.expect_err("not XML-RPC");
        assert!(matches!(err, ClientError::Rpc(XmlRpcError::Parse(_))), "{err}");
        assert!(err.fault().is_none());
    }

    #[tokio::test]
    async fn test_should_time_out() {
        let addr = spawn_server().await;
        let config = ClientConfig::builder()
            .url(format!("http://{addr}/RPC2"))
            .timeout_secs(1)
            .build();
        let client = Client::new(&config).expect("client");

        let err = client.method_call("slow", &[]).await.expect_err("timeout");
        match err {
            ClientError::Transport(e) => assert!(e.is_timeout(), "{e}"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_should_reject_unencodable_params_before_sending() {
        let client = Client::new(&ClientConfig::for_url("http://127.0.0.1:9/RPC2")).expect("client");
        let err = client
            .method_call("echo", &[Value::Double(f64::NAN)])
            .await
            .expect_err("NaN");
        assert!(matches!(err, ClientError::Rpc(XmlRpcError::UnsupportedValue(_))));
    }

    #[test]
    fn test_should_reject_bad_configuration() {
        for url in ["not a url", "ftp://host/RPC2"] {
            let err = Client::new(&ClientConfig::for_url(url)).expect_err(url);
            assert!(matches!(err, ClientError::Config(_)), "{url}: {err}");
        }
        let config = ClientConfig::builder().timeout_secs(0).build();
        assert!(matches!(Client::new(&config), Err(ClientError::Config(_))));
    }
}
