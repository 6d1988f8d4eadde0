//! Real network transport over UDP datagrams, used to demonstrate the wire
//! format from spec §6 end-to-end. `paxos-sim` exercises
//! [`super::sim::SimTransport`] by default since fault injection needs a
//! central authority over delivery; this transport is exposed for anyone
//! wiring the library onto an actual network.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::message::{self, Message, Operation};
use crate::roster::Roster;
use crate::transport::Transport;

struct Inner {
    roster: Roster,
    sockets: RwLock<HashMap<String, Arc<UdpSocket>>>,
}

pub struct UdpTransport<O> {
    inner: Arc<Inner>,
    _marker: PhantomData<O>,
}

impl<O> Clone for UdpTransport<O> {
    fn clone(&self) -> Self {
        UdpTransport { inner: Arc::clone(&self.inner), _marker: PhantomData }
    }
}

impl<O: Operation> UdpTransport<O> {
    pub fn new(roster: Roster) -> Self {
        UdpTransport {
            inner: Arc::new(Inner { roster, sockets: RwLock::new(HashMap::new()) }),
            _marker: PhantomData,
        }
    }

    fn bind(&self, node_id: &str) -> std::io::Result<Arc<UdpSocket>> {
        let addr = self
            .inner
            .roster
            .resolve(node_id)
            .unwrap_or_else(|| panic!("no address configured for {node_id:?}"));
        let std_socket = StdUdpSocket::bind(addr.socket_addr())?;
        std_socket.set_nonblocking(true)?;
        Ok(Arc::new(UdpSocket::from_std(std_socket)?))
    }
}

impl<O: Operation> Transport<O> for UdpTransport<O> {
    fn register(&self, node_id: &str) -> mpsc::UnboundedReceiver<(String, Message<O>)> {
        let socket = self.bind(node_id).unwrap_or_else(|err| panic!("failed to bind {node_id:?}: {err}"));
        self.inner.sockets.write().insert(node_id.to_string(), Arc::clone(&socket));

        let (tx, rx) = mpsc::unbounded_channel();
        let node_id = node_id.to_string();
        tokio::spawn(async move {
            let mut buffer = vec![0u8; 64 * 1024];
            loop {
                let received = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(err) => {
                        log::warn!("{node_id}: udp recv error: {err}");
                        continue;
                    }
                };
                let (len, _from_addr) = received;
                match message::decode::<O>(&buffer[..len]) {
                    Ok(message) => {
                        let sender_id = message.sender_id().to_string();
                        if tx.send((sender_id, message)).is_err() {
                            break;
                        }
                    }
                    Err(err) => log::warn!("{node_id}: dropping malformed datagram: {err}"),
                }
            }
        });
        rx
    }

    fn send(&self, sender_id: &str, receiver_id: &str, message: Message<O>) {
        let Some(addr) = self.inner.roster.resolve(receiver_id) else {
            log::debug!("dropping {message} {sender_id} -> {receiver_id}: unknown receiver");
            return;
        };
        let Some(socket) = self.inner.sockets.read().get(sender_id).cloned() else {
            log::warn!("{sender_id} sent before it was registered; dropping");
            return;
        };
        let target = addr.socket_addr();
        let payload = match message::encode(message) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("failed to encode message from {sender_id}: {err}");
                return;
            }
        };
        let sender_id = sender_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = socket.send_to(&payload, &target).await {
                log::debug!("udp send {sender_id} -> {target} failed: {err}");
            }
        });
    }
}
