//! Fuzz target for RMC envelopes and the parameter reader
//!
//! Feeds arbitrary bytes to both envelope decoders and walks whatever
//! parameters a request carries with the reader calls handlers make.
//! Nothing may panic; malformed input is an error.

#![no_main]

use encore_proto::{AnyDataHolder, RmcRequest, RmcResponse, StreamReader, TextMessage, UserMessage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = RmcResponse::decode(data);

    let Ok(request) = RmcRequest::decode(data) else {
        return;
    };
    assert_eq!(RmcRequest::decode(&request.encode()).ok(), Some(request.clone()));

    let params = &request.parameters;
    let _ = StreamReader::new(params).read_string();
    let _ = StreamReader::new(params).read_u32_list();
    let _ = StreamReader::new(params).read_list(StreamReader::read_structure::<UserMessage>);
    if let Ok(holder) = StreamReader::new(params).read_structure::<AnyDataHolder>() {
        let _ = TextMessage::from_holder(&holder);
    }
});
