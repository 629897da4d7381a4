//! Payload loading and output formatting.

use carpc_protocol::{DispatchError, Encoding, Role};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;

/// Builds the request payload from at most one of the payload options.
pub fn read_payload(
    json: Option<&str>,
    raw: Option<&str>,
    file: Option<&Path>,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match (json, raw, file) {
        (Some(json), None, None) => {
            let value: Value = serde_json::from_str(json)?;
            Ok(serde_json::to_vec(&value)?)
        }
        (None, Some(raw), None) => Ok(raw.as_bytes().to_vec()),
        (None, None, Some(path)) => Ok(std::fs::read(path)?),
        (None, None, None) => Ok(Vec::new()),
        _ => Err("only one of --json, --raw and --file may be given".into()),
    }
}

/// Renders a success reply: pretty JSON when it parses, otherwise hex.
pub fn format_reply(reply: &[u8]) -> String {
    if reply.is_empty() {
        return "(empty reply)".dimmed().to_string();
    }
    match serde_json::from_slice::<Value>(reply) {
        Ok(value) => format_json(&value),
        Err(_) => format!(
            "{} ({} bytes)\n{}",
            "binary".yellow(),
            reply.len(),
            hex::encode(reply)
        ),
    }
}

/// Renders a failed call, including the wire error code when there is one.
pub fn format_error(err: &DispatchError) -> String {
    match err {
        DispatchError::Remote(rpc) => format!(
            "{} [{}]: {}",
            "Error".red(),
            rpc.code.to_string().bold(),
            rpc.message
        ),
        DispatchError::Transport { .. } => format!("{}: {}", "Transport failure".red(), err),
    }
}

/// Lists the catalog, one role section per served role.
pub fn list_operations(role: Option<Role>) -> String {
    let roles: Vec<Role> = match role {
        Some(role) => vec![role],
        None => Role::ALL.to_vec(),
    };

    let mut output = String::new();
    for role in roles {
        output.push_str(&format!("{}\n", role.as_str().bold()));
        for op in role.operations() {
            output.push_str(&format!(
                "  {:<28} {} -> {}\n",
                op.method.as_str().cyan(),
                encoding_label(op.request),
                encoding_label(op.response)
            ));
        }
    }
    output
}

fn encoding_label(encoding: Encoding) -> String {
    match encoding {
        Encoding::Empty => encoding.to_string().dimmed().to_string(),
        _ => encoding.to_string(),
    }
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpc_protocol::{ErrorCode, RpcError};
    use std::io::Write;

    #[test]
    fn test_json_payload_is_compacted() {
        let body = read_payload(Some("{ \"id\" : 7 }"), None, None).unwrap();
        assert_eq!(body, br#"{"id":7}"#);
    }

    #[test]
    fn test_invalid_json_payload_is_rejected() {
        assert!(read_payload(Some("{"), None, None).is_err());
    }

    #[test]
    fn test_raw_and_empty_payloads() {
        assert_eq!(read_payload(None, Some("00ab"), None).unwrap(), b"00ab");
        assert!(read_payload(None, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_file_payload_is_read_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x30, 0x82, 0x01]).unwrap();
        let body = read_payload(None, None, Some(file.path())).unwrap();
        assert_eq!(body, vec![0x30, 0x82, 0x01]);
    }

    #[test]
    fn test_conflicting_payloads_are_rejected() {
        assert!(read_payload(Some("{}"), Some("x"), None).is_err());
    }

    #[test]
    fn test_format_json_reply() {
        let output = format_reply(br#"{"id":1,"contact":["mailto:a@example.com"]}"#);
        assert!(output.contains("\"id\": 1"));
        assert!(output.contains("mailto:a@example.com"));
    }

    #[test]
    fn test_format_binary_reply() {
        let output = format_reply(&[0x30, 0xff, 0x00]);
        assert!(output.contains("3 bytes"));
        assert!(output.contains("30ff00"));
    }

    #[test]
    fn test_format_empty_reply() {
        assert!(format_reply(&[]).contains("empty reply"));
    }

    #[test]
    fn test_format_remote_error() {
        let err = DispatchError::Remote(RpcError::new(ErrorCode::NotFound, "no registration 7"));
        let output = format_error(&err);
        assert!(output.contains("NOT_FOUND"));
        assert!(output.contains("no registration 7"));
    }

    #[test]
    fn test_format_transport_error() {
        let err = DispatchError::transport("connection reset");
        assert!(format_error(&err).contains("connection reset"));
    }

    #[test]
    fn test_list_operations_for_role() {
        let output = list_operations(Some(Role::Va));
        assert!(output.contains("UpdateValidations"));
        assert!(!output.contains("GetRegistration"));
    }

    #[test]
    fn test_list_all_operations() {
        let output = list_operations(None);
        for role in Role::ALL {
            assert!(output.contains(role.as_str()));
        }
        assert!(output.contains("GenerateOCSP"));
        assert!(output.contains("AlreadyDeniedCSR"));
    }
}
