//! Minimal HTTP/1.x handling for the provisioning page.
//!
//! The server task reads until [`handle_request`] stops reporting
//! [`HttpError::Incomplete`], writes the produced response, and closes the
//! connection. Request heads are parsed with `winnow`.

use core::fmt::{self, Write as _};

use heapless::String;
use serde::Deserialize;
use winnow::ModalResult;
use winnow::ascii::{digit1, space0};
use winnow::combinator::{opt, terminated};
use winnow::prelude::*;
use winnow::token::take_till;

use crate::session::{SCAN_TABLE_LEN, ScanTable};
use crate::settings::{AuthKind, Credentials, PASSWORD_MAX_LEN, SSID_MAX_LEN};

/// Port the configuration page listens on.
pub const HTTP_PORT: u16 = 80;

/// Largest request accepted, head and body together.
pub const MAX_REQUEST_LEN: usize = 1024;

/// Largest `/scan.json` body: every name fully `\u00XX`-escaped plus the
/// fixed keys of each entry.
pub const SCAN_JSON_LEN: usize = SCAN_TABLE_LEN * (SSID_MAX_LEN * 6 + 40) + 2;

/// Response buffer that fits the status line, headers, and any body served.
pub const MAX_RESPONSE_LEN: usize = SCAN_JSON_LEN + 128;

/// Page served at `/`.
pub const INDEX_HTML: &str = include_str!("page.html");

/// Request parsing failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpError {
    /// Read more bytes and try again.
    Incomplete,
    Malformed,
    UnsupportedMethod,
    /// The request exceeds [`MAX_REQUEST_LEN`] or the response buffer.
    TooLarge,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Incomplete => "request incomplete",
            Self::Malformed => "malformed request",
            Self::UnsupportedMethod => "unsupported method",
            Self::TooLarge => "request too large",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Parsed request borrowing from the receive buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    /// Path without any query string.
    pub path: &'a str,
    pub body: &'a [u8],
}

struct Head<'a> {
    method: &'a [u8],
    target: &'a [u8],
    content_length: usize,
}

fn request_line<'i>(input: &mut &'i [u8]) -> ModalResult<(&'i [u8], &'i [u8])> {
    let method = terminated(take_till(1.., b' '), b' ').parse_next(input)?;
    let target = terminated(take_till(1.., b' '), b' ').parse_next(input)?;
    (b"HTTP/1.", digit1, b"\r\n").void().parse_next(input)?;
    Ok((method, target))
}

fn header<'i>(input: &mut &'i [u8]) -> ModalResult<(&'i [u8], &'i [u8])> {
    let name = terminated(take_till(1.., |b: u8| b == b':' || b == b'\r'), b':')
        .parse_next(input)?;
    space0.parse_next(input)?;
    let value = terminated(take_till(0.., b'\r'), b"\r\n").parse_next(input)?;
    Ok((name, value))
}

fn head<'i>(input: &mut &'i [u8]) -> ModalResult<Head<'i>> {
    let (method, target) = request_line(input)?;
    let mut content_length = 0;
    while opt(b"\r\n").parse_next(input)?.is_none() {
        let (name, value) = header(input)?;
        if name.eq_ignore_ascii_case(b"content-length") {
            let digits = terminated(digit1, space0).parse_next(&mut &value[..])?;
            content_length = digits.iter().fold(0usize, |total, digit| {
                total
                    .saturating_mul(10)
                    .saturating_add(usize::from(digit - b'0'))
            });
        }
    }
    Ok(Head {
        method,
        target,
        content_length,
    })
}

fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|index| index + 4)
}

/// Parses one request.
///
/// # Errors
///
/// Returns [`HttpError::Incomplete`] until the head and the declared body are
/// fully buffered, and another variant when the request can never be served.
pub fn parse_request(bytes: &[u8]) -> Result<Request<'_>, HttpError> {
    let Some(head_len) = find_head_end(bytes) else {
        return if bytes.len() >= MAX_REQUEST_LEN {
            Err(HttpError::TooLarge)
        } else {
            Err(HttpError::Incomplete)
        };
    };

    let mut input = &bytes[..head_len];
    let head = head(&mut input).map_err(|_| HttpError::Malformed)?;

    if head_len.saturating_add(head.content_length) > MAX_REQUEST_LEN {
        return Err(HttpError::TooLarge);
    }
    let body = bytes
        .get(head_len..head_len + head.content_length)
        .ok_or(HttpError::Incomplete)?;

    let method = match head.method {
        b"GET" => Method::Get,
        b"POST" => Method::Post,
        _ => return Err(HttpError::UnsupportedMethod),
    };
    let target = core::str::from_utf8(head.target).map_err(|_| HttpError::Malformed)?;
    let path = target.split('?').next().unwrap_or(target);

    Ok(Request { method, path, body })
}

#[derive(Deserialize)]
struct ConfigureForm {
    ssid: String<SSID_MAX_LEN>,
    password: String<PASSWORD_MAX_LEN>,
    #[serde(rename = "authMode", default)]
    auth_mode: u8,
}

fn parse_credentials(body: &[u8]) -> Option<Credentials> {
    let (form, _) = serde_json_core::from_slice::<ConfigureForm>(body).ok()?;
    let credentials = Credentials {
        ssid: form.ssid,
        password: form.password,
        auth: AuthKind::from_code(form.auth_mode),
    };
    credentials.is_complete().then_some(credentials)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    InternalError,
    Unavailable,
}

impl Status {
    const fn line(self) -> &'static str {
        match self {
            Self::Ok => "200 OK",
            Self::BadRequest => "400 Bad Request",
            Self::NotFound => "404 Not Found",
            Self::MethodNotAllowed => "405 Method Not Allowed",
            Self::InternalError => "500 Internal Server Error",
            Self::Unavailable => "503 Service Unavailable",
        }
    }
}

struct Cursor<'a> {
    buffer: &'a mut [u8],
    len: usize,
}

impl Cursor<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        let end = self.len + bytes.len();
        self.buffer
            .get_mut(self.len..end)
            .ok_or(HttpError::TooLarge)?
            .copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

impl fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

fn write_response(
    out: &mut [u8],
    status: Status,
    content_type: &str,
    body: &[u8],
) -> Result<usize, HttpError> {
    let mut cursor = Cursor {
        buffer: out,
        len: 0,
    };
    write!(
        cursor,
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status.line(),
        content_type,
        body.len()
    )
    .map_err(|_| HttpError::TooLarge)?;
    cursor.put(body)?;
    Ok(cursor.len)
}

/// Renders the scan table as `[{"ssid","rssi","authMode"}]`.
///
/// # Errors
///
/// Returns [`HttpError::TooLarge`] when `out` cannot hold the array.
pub fn render_scan(table: &ScanTable, out: &mut [u8]) -> Result<usize, HttpError> {
    serde_json_core::to_slice(table.entries(), out).map_err(|_| HttpError::TooLarge)
}

/// Outcome of serving one buffered request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpExchange {
    /// Bytes of `out` holding the response.
    pub response_len: usize,
    /// Credentials submitted through `/configure`.
    pub submitted: Option<Credentials>,
}

/// Serves the request buffered in `request`, writing the response into `out`.
///
/// `/configure` only yields credentials while `accepting_credentials` holds;
/// otherwise it answers 503 and submits nothing.
///
/// # Errors
///
/// Returns [`HttpError::Incomplete`] while more bytes are needed and
/// [`HttpError::TooLarge`] when `out` cannot hold the response. Malformed
/// requests and unknown methods still produce a response.
pub fn handle_request(
    request: &[u8],
    scan: &ScanTable,
    accepting_credentials: bool,
    out: &mut [u8],
) -> Result<HttpExchange, HttpError> {
    let request = match parse_request(request) {
        Ok(request) => request,
        Err(HttpError::Incomplete) => return Err(HttpError::Incomplete),
        Err(HttpError::UnsupportedMethod) => {
            let response_len = write_response(out, Status::MethodNotAllowed, "text/plain", b"")?;
            return Ok(HttpExchange {
                response_len,
                submitted: None,
            });
        }
        Err(_) => {
            let response_len = write_response(out, Status::BadRequest, "text/plain", b"")?;
            return Ok(HttpExchange {
                response_len,
                submitted: None,
            });
        }
    };

    let mut submitted = None;
    let response_len = match (request.method, request.path) {
        (Method::Get, "/") => {
            write_response(out, Status::Ok, "text/html", INDEX_HTML.as_bytes())?
        }
        (Method::Get, "/scan.json") => {
            let mut json = [0u8; SCAN_JSON_LEN];
            match render_scan(scan, &mut json) {
                Ok(len) => write_response(out, Status::Ok, "application/json", &json[..len])?,
                Err(_) => write_response(out, Status::InternalError, "text/plain", b"")?,
            }
        }
        (Method::Post, "/configure") if !accepting_credentials => {
            write_response(out, Status::Unavailable, "text/plain", b"")?
        }
        (Method::Post, "/configure") => match parse_credentials(request.body) {
            Some(credentials) => {
                submitted = Some(credentials);
                write_response(out, Status::Ok, "text/plain", b"")?
            }
            None => write_response(out, Status::BadRequest, "text/plain", b"")?,
        },
        _ => write_response(out, Status::NotFound, "text/plain", b"")?,
    };

    Ok(HttpExchange {
        response_len,
        submitted,
    })
}

#[cfg(test)]
mod tests {
    use core::fmt::Write;

    use super::*;
    use crate::session::ScanResult;

    fn response_text<'a>(out: &'a [u8], exchange: &HttpExchange) -> &'a str {
        core::str::from_utf8(&out[..exchange.response_len]).unwrap()
    }

    #[test]
    fn parses_request_line_headers_and_body() {
        let raw = b"POST /configure?x=1 HTTP/1.1\r\nHost: 192.168.4.1\r\nContent-Length: 4\r\n\r\nabcd";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/configure");
        assert_eq!(request.body, b"abcd");
    }

    #[test]
    fn waits_for_head_and_body() {
        assert_eq!(parse_request(b"GET / HTTP/1.1\r\nHost: a"), Err(HttpError::Incomplete));
        assert_eq!(
            parse_request(b"POST /configure HTTP/1.1\r\ncontent-length: 10\r\n\r\n{}"),
            Err(HttpError::Incomplete)
        );
    }

    #[test]
    fn rejects_garbage_head() {
        assert_eq!(parse_request(b"hello\r\n\r\n"), Err(HttpError::Malformed));
    }

    #[test]
    fn configure_submits_credentials() {
        let body = br#"{"ssid":"shop","password":"hunter22","authMode":7}"#;
        let mut raw = heapless::Vec::<u8, 256>::new();
        write!(
            HeaplessBytes(&mut raw),
            "POST /configure HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .unwrap();
        raw.extend_from_slice(body).unwrap();

        let mut out = [0u8; 256];
        let exchange = handle_request(&raw, &ScanTable::new(), true, &mut out).unwrap();
        assert!(response_text(&out, &exchange).starts_with("HTTP/1.1 200 OK"));
        let submitted = exchange.submitted.unwrap();
        assert_eq!(submitted.ssid, "shop");
        assert_eq!(submitted.password, "hunter22");
        assert_eq!(submitted.auth, AuthKind::Wpa2Aes);
    }

    #[test]
    fn configure_without_password_is_rejected() {
        let raw = b"POST /configure HTTP/1.1\r\nContent-Length: 12\r\n\r\n{\"ssid\":\"a\"}";
        let mut out = [0u8; 256];
        let exchange = handle_request(raw, &ScanTable::new(), true, &mut out).unwrap();
        assert!(response_text(&out, &exchange).starts_with("HTTP/1.1 400"));
        assert_eq!(exchange.submitted, None);
    }

    #[test]
    fn serves_scan_table_as_json() {
        let mut table = ScanTable::new();
        table.offer(ScanResult {
            ssid: String::try_from("barn").unwrap(),
            rssi: -48,
            auth: AuthKind::Wpa2Aes,
        });
        let mut out = [0u8; 512];
        let exchange =
            handle_request(b"GET /scan.json HTTP/1.1\r\n\r\n", &table, true, &mut out).unwrap();
        assert!(
            response_text(&out, &exchange)
                .ends_with(r#"[{"ssid":"barn","rssi":-48,"authMode":7}]"#)
        );
    }

    #[test]
    fn unknown_paths_and_methods() {
        let mut out = [0u8; 256];
        let missing =
            handle_request(b"GET /nope HTTP/1.1\r\n\r\n", &ScanTable::new(), true, &mut out).unwrap();
        assert!(response_text(&out, &missing).starts_with("HTTP/1.1 404"));
        let put = handle_request(b"PUT / HTTP/1.1\r\n\r\n", &ScanTable::new(), true, &mut out).unwrap();
        assert!(response_text(&out, &put).starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn configure_is_refused_once_provisioning_ends() {
        let body = br#"{"ssid":"shop","password":"hunter22","authMode":7}"#;
        let mut raw = heapless::Vec::<u8, 256>::new();
        write!(
            HeaplessBytes(&mut raw),
            "POST /configure HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .unwrap();
        raw.extend_from_slice(body).unwrap();

        let mut out = [0u8; 256];
        let exchange = handle_request(&raw, &ScanTable::new(), false, &mut out).unwrap();
        assert!(response_text(&out, &exchange).starts_with("HTTP/1.1 503"));
        assert_eq!(exchange.submitted, None);
    }

    #[test]
    fn full_table_of_long_escaped_names_fits_the_response() {
        let mut table = ScanTable::new();
        for index in 0..SCAN_TABLE_LEN {
            let mut ssid = String::<SSID_MAX_LEN>::new();
            while ssid.len() < SSID_MAX_LEN - 1 {
                ssid.push('"').unwrap();
            }
            ssid.push(char::from(b'a' + u8::try_from(index).unwrap())).unwrap();
            let rssi = -40 - i16::try_from(index).unwrap();
            assert!(table.offer(ScanResult {
                ssid,
                rssi,
                auth: AuthKind::Wpa2Aes,
            }));
        }
        assert_eq!(table.len(), SCAN_TABLE_LEN);

        let mut out = [0u8; MAX_RESPONSE_LEN];
        let exchange =
            handle_request(b"GET /scan.json HTTP/1.1\r\n\r\n", &table, true, &mut out).unwrap();
        let text = response_text(&out, &exchange);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.ends_with("\"authMode\":7}]"));
    }

    struct HeaplessBytes<'a>(&'a mut heapless::Vec<u8, 256>);

    impl fmt::Write for HeaplessBytes<'_> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0.extend_from_slice(s.as_bytes()).map_err(|_| fmt::Error)
        }
    }
}
