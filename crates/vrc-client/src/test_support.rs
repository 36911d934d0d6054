//! Shared fixtures for client tests.

use std::time::Duration;

use vrc_test_harness::{MockHandle, MockTransport};

use crate::{VrcClient, VrcClientBuilder};

pub(crate) const ROLE1: &str = "ROLE1000000000000000000000000001";
pub(crate) const ROLE2: &str = "ROLE2000000000000000000000000002";
pub(crate) const RADIO1: &str = "RADIO100000000000000000000000001";
pub(crate) const RADIO2: &str = "RADIO200000000000000000000000002";
pub(crate) const NET1: &str = "NET10000000000000000000000000001";
pub(crate) const NET2: &str = "NET20000000000000000000000000002";
pub(crate) const CALL1: &str = "CALL1000000000000000000000000001";
pub(crate) const EP1: &str = "EP100000000000000000000000000001";
pub(crate) const EP2: &str = "EP200000000000000000000000000002";

/// A client that completed its handshake with a mock server, with the send
/// log and change flag cleared.
pub(crate) async fn connected() -> (VrcClient, MockHandle) {
    let mock = MockTransport::new();
    let server = mock.handle();
    server.greet(0x1234);
    let mut client = VrcClientBuilder::new()
        .command_timeout(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(1))
        .build_with_transport(Box::new(mock));
    client
        .wait_for_handshake()
        .await
        .expect("mock handshake");
    client.update().await;
    server.clear_sent();
    (client, server)
}

/// [`connected`] plus two radios sharing two nets, radio 1 tuned to net 1.
pub(crate) async fn with_radios() -> (VrcClient, MockHandle) {
    let (mut client, server) = connected().await;
    server.push_lines([
        format!("S1|net {NET1} name=Guard freq=243000000 crypto_system=1 crypto_key=4"),
        format!("S2|net {NET2} name=Tower freq=124500000"),
        format!("S1|radio {RADIO1} name=UHF nets={NET1},{NET2} net={NET1} rx=1"),
        format!("S2|radio {RADIO2} name=VHF nets={NET2}"),
    ]);
    client.update().await;
    (client, server)
}
