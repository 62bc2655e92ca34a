use super::*;

#[test]
fn encodes_send_with_content_length_and_escaped_headers() {
    let frame = Frame::send("/app/chat.sendMessage/r:1", "application/json", "{}");
    let encoded = String::from_utf8(frame.encode()).expect("utf8");
    assert_eq!(
        encoded,
        "SEND\ndestination:/app/chat.sendMessage/r\\c1\ncontent-type:application/json\ncontent-length:2\n\n{}\0"
    );
}

#[test]
fn connect_headers_are_written_raw() {
    let frame = Frame::connect("chat.example.com", HeartBeat::from_millis(10_000, 10_000))
        .with_header("Authorization", "Bearer a:b");
    let encoded = String::from_utf8(frame.encode()).expect("utf8");
    assert!(encoded.starts_with("CONNECT\naccept-version:1.2\nhost:chat.example.com\n"));
    assert!(encoded.contains("heart-beat:10000,10000\n"));
    assert!(encoded.contains("Authorization:Bearer a:b\n"));
    assert!(encoded.ends_with("\n\n\0"));
}

#[test]
fn decodes_message_frame_without_content_length() {
    let raw = b"MESSAGE\nsubscription:sub-1\nmessage-id:9\ndestination:/topic/public/r1\n\n{\"a\":1}\0\n\n";
    let frame = Frame::decode(raw).expect("decode");
    assert_eq!(frame.command, Command::Message);
    assert_eq!(frame.header("subscription"), Some("sub-1"));
    assert_eq!(frame.body_str().expect("body"), "{\"a\":1}");
}

#[test]
fn content_length_allows_nul_inside_body() {
    let raw = b"MESSAGE\ncontent-length:3\n\na\0b\0";
    let frame = Frame::decode(raw).expect("decode");
    assert_eq!(frame.body, b"a\0b".to_vec());
}

#[test]
fn accepts_crlf_lines_and_leading_heartbeats() {
    let raw = b"\r\n\nCONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
    let frame = Frame::decode(raw).expect("decode");
    assert_eq!(frame.command, Command::Connected);
    assert_eq!(frame.header("version"), Some("1.2"));
    assert!(frame.body.is_empty());
}

#[test]
fn first_repeated_header_wins() {
    let raw = b"MESSAGE\nfoo:first\nfoo:second\n\n\0";
    let frame = Frame::decode(raw).expect("decode");
    assert_eq!(frame.header("foo"), Some("first"));
}

#[test]
fn unescapes_header_values() {
    let raw = b"ERROR\nmessage:bad\\cvalue\\nline\\\\end\n\n\0";
    let frame = Frame::decode(raw).expect("decode");
    assert_eq!(frame.header("message"), Some("bad:value\nline\\end"));
}

#[test]
fn decode_reports_malformed_input() {
    assert_eq!(Frame::decode(b""), Err(FrameError::Empty));
    assert_eq!(
        Frame::decode(b"HELLO\n\n\0"),
        Err(FrameError::UnknownCommand("HELLO".into()))
    );
    assert_eq!(
        Frame::decode(b"MESSAGE\nno-colon\n\n\0"),
        Err(FrameError::MalformedHeader("no-colon".into()))
    );
    assert_eq!(
        Frame::decode(b"MESSAGE\nx:\\t\n\n\0"),
        Err(FrameError::InvalidEscape("\\t".into()))
    );
    assert_eq!(Frame::decode(b"MESSAGE\n\nbody"), Err(FrameError::MissingNull));
    assert_eq!(Frame::decode(b"MESSAGE\nx:y"), Err(FrameError::Truncated));
    assert_eq!(
        Frame::decode(b"MESSAGE\ncontent-length:nine\n\n\0"),
        Err(FrameError::InvalidContentLength("nine".into()))
    );
    assert_eq!(
        Frame::decode(b"MESSAGE\n\nbody\0junk"),
        Err(FrameError::TrailingData)
    );
}

#[test]
fn bare_eols_are_heartbeats() {
    assert_eq!(StompMessage::decode(b"\n"), Ok(StompMessage::Heartbeat));
    assert_eq!(StompMessage::decode(b"\r\n"), Ok(StompMessage::Heartbeat));
    assert_eq!(StompMessage::Heartbeat.encode(), b"\n".to_vec());
}

#[test]
fn decodes_what_it_encodes_for_subscribe() {
    let frame = Frame::subscribe("sub-3", "/topic/user/cs@example.com/notifications");
    let decoded = Frame::decode(&frame.encode()).expect("decode");
    assert_eq!(decoded, frame);
}
