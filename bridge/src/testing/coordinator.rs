//! Channel orchestration and packet relay across two chains.

use cosmwasm_std::{IbcEndpoint, IbcOrder, IbcPacket};
use tracing::debug;

use crate::error::BridgeError;
use crate::state::ClientView;

use super::chain::Chain;

/// The two ends of one channel.
#[derive(Clone, Debug)]
pub struct ChannelPair {
    pub a: IbcEndpoint,
    pub b: IbcEndpoint,
}

/// Drives two chains: handshakes, client updates and packet relay. Plays
/// the role of the off-chain relayer, so no proofs are verified here.
pub struct Coordinator {
    pub chain_a: Chain,
    pub chain_b: Chain,
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator {
            chain_a: Chain::new("chain-a"),
            chain_b: Chain::new("chain-b"),
        }
    }

    fn view_of(chain: &Chain) -> ClientView {
        ClientView {
            height: chain.block.height,
            timestamp: chain.block.time,
        }
    }

    /// Advance both chains one block.
    pub fn commit_block(&mut self) {
        self.chain_a.next_block();
        self.chain_b.next_block();
    }

    /// Full channel handshake between `port_a` on chain A and `port_b` on
    /// chain B.
    pub fn create_channel(
        &mut self,
        port_a: &str,
        port_b: &str,
        version: &str,
        order: IbcOrder,
    ) -> Result<ChannelPair, BridgeError> {
        let view_a = Self::view_of(&self.chain_a);
        let view_b = Self::view_of(&self.chain_b);

        let (channel_a, version_a) =
            self.chain_a
                .channel_open_init(port_a, port_b, order.clone(), version, view_b)?;
        let version_a = version_a.unwrap_or_else(|| version.to_string());

        let (channel_b, version_b) = self.chain_b.channel_open_try(
            port_b,
            IbcEndpoint {
                port_id: port_a.to_string(),
                channel_id: channel_a.clone(),
            },
            order,
            &version_a,
            &version_a,
            view_a,
        )?;
        let version_b = version_b.unwrap_or(version_a);

        self.chain_a
            .channel_open_ack(&channel_a, &channel_b, &version_b)?;
        self.chain_b.channel_open_confirm(&channel_b)?;

        debug!(channel_a = %channel_a, channel_b = %channel_b, "channel established");
        Ok(ChannelPair {
            a: IbcEndpoint {
                port_id: port_a.to_string(),
                channel_id: channel_a,
            },
            b: IbcEndpoint {
                port_id: port_b.to_string(),
                channel_id: channel_b,
            },
        })
    }

    /// Refresh each side's view of the other for `pair`'s channels.
    pub fn update_clients(&mut self, pair: &ChannelPair) -> Result<(), BridgeError> {
        let view_a = Self::view_of(&self.chain_a);
        let view_b = Self::view_of(&self.chain_b);
        self.chain_a.update_client(&pair.a.channel_id, view_b)?;
        self.chain_b.update_client(&pair.b.channel_id, view_a)?;
        Ok(())
    }

    /// Relay every pending packet on `pair` in both directions, delivering
    /// each acknowledgement back to its sender. Repeats until no endpoint
    /// has follow-up packets in flight.
    pub fn relay_and_ack_pending_packets(&mut self, pair: &ChannelPair) -> Result<(), BridgeError> {
        loop {
            let pending_a = pending_on(&self.chain_a, &pair.a);
            let pending_b = pending_on(&self.chain_b, &pair.b);
            if pending_a.is_empty() && pending_b.is_empty() {
                return Ok(());
            }
            for packet in pending_a {
                self.chain_b.next_block();
                self.update_clients(pair)?;
                let ack = self.chain_b.deliver_packet(&packet)?;
                self.chain_a.deliver_ack(&packet, ack)?;
            }
            for packet in pending_b {
                self.chain_a.next_block();
                self.update_clients(pair)?;
                let ack = self.chain_a.deliver_packet(&packet)?;
                self.chain_b.deliver_ack(&packet, ack)?;
            }
        }
    }

    /// Time out every packet chain A has in flight on `pair`, advancing
    /// chain B past each deadline first.
    pub fn timeout_pending_packets(&mut self, pair: &ChannelPair) -> Result<(), BridgeError> {
        let pending = pending_on(&self.chain_a, &pair.a);
        for packet in pending {
            if let Some(timestamp) = packet.timeout.timestamp() {
                if self.chain_b.block.time <= timestamp {
                    self.chain_b.block.time = timestamp.plus_seconds(1);
                }
            }
            if let Some(block) = packet.timeout.block() {
                if self.chain_b.block.height <= block.height {
                    self.chain_b.block.height = block.height + 1;
                }
            }
            self.chain_b.next_block();
            self.chain_a.deliver_timeout(&packet)?;
        }
        Ok(())
    }

    /// Close the channel from chain A's side and deliver the closure to
    /// chain B.
    pub fn close_channel(&mut self, pair: &ChannelPair) -> Result<(), BridgeError> {
        self.chain_a.channel_close(&pair.a.channel_id, true)?;
        self.chain_b.channel_close(&pair.b.channel_id, false)?;
        Ok(())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn pending_on(chain: &Chain, endpoint: &IbcEndpoint) -> Vec<IbcPacket> {
    chain
        .pending_send_packets()
        .into_iter()
        .filter(|packet| packet.src.channel_id == endpoint.channel_id)
        .collect()
}
