//! Fuzz target for the JSON tunnel
//!
//! Arbitrary text through request and response parsing. Parsed requests
//! must survive their own serialization.

#![no_main]

use encore_proto::tunnel::{TunnelRequest, TunnelResponse};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = TunnelResponse::parse(text);

    if let Ok(request) = TunnelRequest::parse(text) {
        let reparsed = TunnelRequest::parse(&request.to_json_string()).expect("serialized request parses");
        assert_eq!(reparsed, request);
    }
});
