// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ics_core::attributes::{AttrValue, ModifyOp};

#[test]
fn requests_round_trip() {
    let requests = vec![
        Request::Ping,
        Request::ResAdd {
            name: "r1".to_string(),
            group: "G".to_string(),
            remote: false,
        },
        Request::ResState {
            names: vec!["r1".to_string()],
            cluster: true,
        },
        Request::GrpOnline {
            name: "G".to_string(),
            node: Some("n2".to_string()),
        },
        Request::NodeModify {
            attr: "NodeList".to_string(),
            op: ModifyOp::Append {
                value: "n2".to_string(),
            },
            remote: true,
        },
        Request::ResWait {
            name: "r1".to_string(),
            state: ics_core::states::ResourceState::Online,
            timeout_secs: 30,
        },
    ];
    for request in requests {
        let encoded = encode(&request).unwrap();
        let decoded: Request = decode(&encoded).unwrap();
        assert_eq!(decoded, request);
    }
}

#[test]
fn remote_and_cluster_flags_default_to_false() {
    let request: Request =
        serde_json::from_str(r#"{"type": "ResAdd", "name": "r1", "group": "G"}"#).unwrap();
    assert_eq!(
        request,
        Request::ResAdd {
            name: "r1".to_string(),
            group: "G".to_string(),
            remote: false,
        }
    );

    let request: Request = serde_json::from_str(r#"{"type": "GrpState"}"#).unwrap();
    assert_eq!(
        request,
        Request::GrpState {
            names: Vec::new(),
            cluster: false,
        }
    );
}

#[test]
fn responses_round_trip() {
    let responses = vec![
        Response::Ok,
        Response::Error {
            message: "boom".to_string(),
        },
        Response::Value {
            value: AttrValue::List(vec!["h1".to_string()]),
        },
        Response::States {
            rows: vec![StateRow {
                node: Some("n1".to_string()),
                name: "r1".to_string(),
                state: "online".to_string(),
            }],
        },
        Response::Load { load: 12 },
    ];
    for response in responses {
        let encoded = encode(&response).unwrap();
        let decoded: Response = decode(&encoded).unwrap();
        assert_eq!(decoded, response);
    }
}

#[test]
fn state_row_node_is_omitted_when_local() {
    let row = StateRow {
        node: None,
        name: "r1".to_string(),
        state: "offline".to_string(),
    };
    let json = serde_json::to_value(&row).unwrap();
    assert!(json.get("node").is_none());
}

#[tokio::test]
async fn framing_round_trips_over_a_stream() {
    let (mut client, mut server) = tokio::io::duplex(4096);

    let request = Request::GrpList { cluster: false };
    let data = encode(&request).unwrap();
    write_message(&mut client, &data).await.unwrap();

    let received = read_request(&mut server, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(received, request);

    let response = Response::Names {
        names: vec!["G".to_string()],
    };
    write_response(&mut server, &response, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    let bytes = read_message(&mut client).await.unwrap();
    let received: Response = decode(&bytes).unwrap();
    assert_eq!(received, response);
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let len = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
    tokio::io::AsyncWriteExt::write_all(&mut client, &len)
        .await
        .unwrap();

    let result = read_message(&mut server).await;
    assert!(matches!(
        result,
        Err(ProtocolError::MessageTooLarge { .. })
    ));
}
