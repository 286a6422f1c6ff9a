use deskclock_common::ConnectError;
use serde::Deserialize;

pub const PORTAL_HTML: &str = include_str!("../web/portal.html");
pub const CONNECT_ACCEPTED: &str = "Connecting... check the display";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectForm {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

/// Decodes an `application/x-www-form-urlencoded` credential body.
#[cfg_attr(not(feature = "esp32"), allow(dead_code))]
pub fn parse_connect_form(body: &[u8]) -> ConnectForm {
    let body = String::from_utf8_lossy(body);
    let mut form = ConnectForm {
        ssid: String::new(),
        password: String::new(),
    };
    for pair in body.split('&') {
        let mut parts = pair.splitn(2, '=');
        let name = parts.next().unwrap_or_default();
        let value = decode_component(parts.next().unwrap_or_default());
        match name {
            "ssid" => form.ssid = value,
            "password" => form.password = value,
            _ => {}
        }
    }
    form
}

fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                (Some(high), Some(low)) => {
                    out.push(high << 4 | low);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub fn connect_reply(verdict: &Result<(), ConnectError>) -> (u16, String) {
    match verdict {
        Ok(()) => (200, CONNECT_ACCEPTED.to_string()),
        Err(err @ ConnectError::NotAcceptingCredentials { .. }) => (409, err.to_string()),
        Err(err @ (ConnectError::EmptySsid | ConnectError::CredentialTooLong)) => {
            (400, err.to_string())
        }
    }
}
