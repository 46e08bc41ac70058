//! ARP address resolution
//!
//! The ARP cache itself belongs to the protocol engine; the core only runs
//! the wait loop around it.

use super::error::{NetError, Result};
use super::Stack;
use crate::config::{ARP_POLL_DELAY_US, ARP_RESOLVE_RETRIES, CHAR_CTRL_C};

impl Stack {
    /// Resolve `ip` to a hardware address.
    ///
    /// Sends one request then polls up to `ARP_RESOLVE_RETRIES` times.
    /// Ctrl-C on the console aborts the wait.
    pub fn resolve_hw_addr(&self, ip: [u8; 4]) -> Result<[u8; 6]> {
        self.engine.send_arp_request(ip)?;

        for _ in 0..ARP_RESOLVE_RETRIES {
            if self.console.read_byte() == Some(CHAR_CTRL_C) {
                crate::log!("[ARP] resolution of {}.{}.{}.{} cancelled", ip[0], ip[1], ip[2], ip[3]);
                return Err(NetError::Cancelled);
            }

            self.engine.poll(&self.table);
            if let Some(mac) = self.engine.resolved_hw_addr(ip) {
                crate::net_trace!("[ARP] {}.{}.{}.{} is at {:02x?}", ip[0], ip[1], ip[2], ip[3], mac);
                return Ok(mac);
            }

            self.ticks.delay_us(ARP_POLL_DELAY_US);
        }

        crate::log_warn!("[ARP] no reply from {}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]);
        Err(NetError::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netstack::mock;

    const GATEWAY: [u8; 4] = [10, 0, 0, 1];
    const GATEWAY_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x35, 0x02];

    #[test]
    fn test_resolve_known_host() {
        let h = mock::harness();
        h.engine.add_host(GATEWAY, GATEWAY_MAC);
        assert_eq!(h.stack.resolve_hw_addr(GATEWAY), Ok(GATEWAY_MAC));
        assert_eq!(h.engine.arp_requests(), [GATEWAY]);
    }

    #[test]
    fn test_resolve_cancelled_from_console() {
        let h = mock::harness();
        h.console.push_input(&[b'x', CHAR_CTRL_C]);
        assert_eq!(h.stack.resolve_hw_addr(GATEWAY), Err(NetError::Cancelled));
        // One poll for the stray key, then the cancel
        assert_eq!(h.engine.polls(), 1);
    }

    #[test]
    fn test_resolve_unreachable() {
        let h = mock::harness();
        assert_eq!(h.stack.resolve_hw_addr([10, 0, 0, 99]), Err(NetError::Unreachable));
        assert_eq!(h.engine.polls(), ARP_RESOLVE_RETRIES as usize);
        assert_eq!(h.ticks.micros(), ARP_RESOLVE_RETRIES as u64 * ARP_POLL_DELAY_US);
    }
}
