use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::events::{Event, Reporter};

lazy_static! {
    // Received: from a13-67.smtp-out.example.com (a13-67.smtp-out.example.com [192.0.2.0])
    //   by mail.example.com (Postfix) with ESMTPS id 22DFB60A62
    static ref RECEIVED_FROM: Regex =
        Regex::new(r"^from\s+(\S+)\s+\((?P<hostname>\S+)\s+\[(?P<ip>[^\]]+)\]\)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    pub ip: String,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("continuation line {line} has no header to continue")]
    OrphanContinuation { line: usize },
    #[error("header on line {line} has no name")]
    EmptyName { line: usize },
}

/// Splits the header section of a raw message into `(name, value)` fields.
///
/// Only bytes up to the first empty line are looked at. Folded values keep
/// their line breaks.
pub fn parse_headers(message: &[u8]) -> Result<Vec<(String, String)>, HeaderError> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for (index, raw) in message.split(|&b| b == b'\n').enumerate() {
        let line_no = index + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        if raw.is_empty() {
            break;
        }
        // mbox separator
        if index == 0 && raw.starts_with(b"From ") {
            continue;
        }

        let line = String::from_utf8_lossy(raw);

        if line.starts_with(' ') || line.starts_with('\t') {
            match fields.last_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(&line);
                }
                None => return Err(HeaderError::OrphanContinuation { line: line_no }),
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            // Not a field: whatever follows is body.
            break;
        };
        if name.is_empty() {
            return Err(HeaderError::EmptyName { line: line_no });
        }
        if !name.bytes().all(|b| b.is_ascii_graphic()) {
            break;
        }

        fields.push((name.to_string(), value.trim_start().to_string()));
    }

    Ok(fields)
}

/// Matches a single `Received` value against the relay pattern.
pub fn parse_received(value: &str) -> Option<SenderInfo> {
    let caps = RECEIVED_FROM.captures(value)?;
    Some(SenderInfo {
        ip: caps["ip"].to_string(),
        hostname: caps["hostname"].to_string(),
    })
}

/// Returns the sender server of the first `Received` header that matches,
/// in header order. Never fails: problems are reported as warnings.
///
/// rspamd scores SPF and DMARC against the connecting server, which is
/// lost once a message sits in a mail store. The last relay recorded itself
/// in a `Received` header, and the server found there is handed back to
/// rspamc as a hint. RFC 5322 only fixes the rough shape of `Received`, so
/// this is a conservative pattern rather than a grammar.
pub fn extract_sender_info(message: &[u8], reporter: &dyn Reporter) -> Option<SenderInfo> {
    let fields = match parse_headers(message) {
        Ok(fields) => fields,
        Err(e) => {
            reporter.report(Event::UnparseableHeaders {
                reason: e.to_string(),
            });
            return None;
        }
    };

    let received: Vec<&str> = fields
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("received"))
        .map(|(_, value)| value.as_str())
        .collect();

    if let Some(info) = received.iter().find_map(|value| parse_received(value)) {
        reporter.report(Event::SenderFound { info: info.clone() });
        return Some(info);
    }

    let oneline = received
        .iter()
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ");
    reporter.report(Event::NoRelayMatch { received: oneline });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryReporter;

    const POSTFIX_MESSAGE: &str = "Return-Path: <bounce@smtp-out.example.com>\r\n\
Delivered-To: mail@example.org\r\n\
Received: from localhost (localhost [127.0.0.1])\r\n\
\tby mail.example.org (Postfix) with ESMTP id 11AA\r\n\
\tfor <mail@example.org>; Thu, 30 Jul 2020 10:25:23 +0200 (CEST)\r\n\
Received: from a13-67.smtp-out.example.com (a13-67.smtp-out.example.com [192.0.2.7])\r\n\
\tby mail.example.org (Postfix) with ESMTPS id 22DFB60A62\r\n\
\tfor <mail@example.org>; Thu, 30 Jul 2020 10:25:22 +0200 (CEST)\r\n\
Subject: hello\r\n\
\r\n\
Received: from body.example.com (body.example.com [203.0.113.1])\r\n";

    #[test]
    fn test_first_matching_header_wins() {
        let reporter = MemoryReporter::new();
        let info = extract_sender_info(POSTFIX_MESSAGE.as_bytes(), &reporter);

        assert_eq!(
            info,
            Some(SenderInfo {
                ip: "127.0.0.1".to_string(),
                hostname: "localhost".to_string(),
            })
        );
        assert!(reporter.warnings().is_empty());
    }

    #[test]
    fn test_skips_non_matching_headers() {
        let message = "Received: by mail.example.org (Postfix, from userid 0)\n\
\tid 99; Thu, 30 Jul 2020 10:25:24 +0200 (CEST)\n\
received: from relay.example.net (relay.example.net\n\
\t[198.51.100.20]) by mx.example.org\n\
\n\
body\n";
        let reporter = MemoryReporter::new();
        let info = extract_sender_info(message.as_bytes(), &reporter).unwrap();

        assert_eq!(info.ip, "198.51.100.20");
        assert_eq!(info.hostname, "relay.example.net");
    }

    #[test]
    fn test_no_match_warns_with_collapsed_headers() {
        let message = "Received: by mail.example.org (Postfix)\n\
\t  id 99;   Thu, 30 Jul 2020\n\
Received: from unknown\n\
Subject: x\n\
\n";
        let reporter = MemoryReporter::new();

        assert_eq!(extract_sender_info(message.as_bytes(), &reporter), None);
        assert_eq!(
            reporter.warnings(),
            vec![Event::NoRelayMatch {
                received: "by mail.example.org (Postfix) id 99; Thu, 30 Jul 2020 from unknown"
                    .to_string()
            }]
        );
    }

    #[test]
    fn test_body_is_not_searched() {
        let message = "Subject: hi\n\nReceived: from a (b [192.0.2.1])\n";
        let reporter = MemoryReporter::new();

        assert_eq!(extract_sender_info(message.as_bytes(), &reporter), None);
        assert_eq!(
            reporter.warnings(),
            vec![Event::NoRelayMatch {
                received: String::new()
            }]
        );
    }

    #[test]
    fn test_unparseable_headers() {
        let reporter = MemoryReporter::new();
        let message = b"\tcontinued\nReceived: from a (b [192.0.2.1])\n\n";

        assert_eq!(extract_sender_info(message, &reporter), None);
        assert!(matches!(
            reporter.warnings().as_slice(),
            [Event::UnparseableHeaders { .. }]
        ));
        assert_eq!(
            parse_headers(b": nameless\n\n"),
            Err(HeaderError::EmptyName { line: 1 })
        );
    }

    #[test]
    fn test_header_error_messages() {
        let err = parse_headers(b"Subject: x\n: nameless\n\n").unwrap_err();
        assert_eq!(err.to_string(), "header on line 2 has no name");
        assert_eq!(
            HeaderError::OrphanContinuation { line: 1 }.to_string(),
            "continuation line 1 has no header to continue"
        );
        let err: anyhow::Error = err.into();
        assert!(err.downcast_ref::<HeaderError>().is_some());
    }

    #[test]
    fn test_parse_headers_mbox_and_folding() {
        let message = b"From MAILER-DAEMON Thu Jul 30 10:25:22 2020\n\
Subject: a\n folded\nX-Bin: \xff\n\nSubject: body\n";
        let fields = parse_headers(message).unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], ("Subject".to_string(), "a\n folded".to_string()));
        assert_eq!(fields[1].0, "X-Bin");
    }

    #[test]
    fn test_parse_received_anchored() {
        assert_eq!(parse_received("by x from a (b [192.0.2.1])"), None);
        assert_eq!(parse_received("from a (b)"), None);
        assert_eq!(
            parse_received("from [192.0.2.9] (helo.example [192.0.2.9])").map(|i| i.ip),
            Some("192.0.2.9".to_string())
        );
    }
}
