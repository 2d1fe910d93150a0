use rotbridge_net::Channel;

/// Bytes one party moved over the channel during a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferCost {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl TransferCost {
    pub fn total(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }
}

/// Snapshot of the channel counters at the start of a batch.
#[derive(Debug, Clone, Copy)]
pub struct CostAccountant {
    sent: u64,
    received: u64,
}

impl CostAccountant {
    pub fn start(conn: &Channel) -> Self {
        Self {
            sent: conn.bytes_sent(),
            received: conn.bytes_received(),
        }
    }

    /// Traffic since [`CostAccountant::start`]. The counters of a channel
    /// never decrease.
    pub fn measure(&self, conn: &Channel) -> TransferCost {
        TransferCost {
            bytes_sent: conn.bytes_sent() - self.sent,
            bytes_received: conn.bytes_received() - self.received,
        }
    }
}

#[cfg(test)]
mod tests {
    use rotbridge_net::testing::local_channels;

    use super::*;

    #[tokio::test]
    async fn measures_delta() -> anyhow::Result<()> {
        let (mut c1, mut c2) = local_channels().await?;
        c1.send_bytes(&[0; 10]).await?;
        c1.flush().await?;
        c2.recv_bytes(&mut [0; 10]).await?;

        let (a1, a2) = (CostAccountant::start(&c1), CostAccountant::start(&c2));
        c1.send_bytes(&[0; 5]).await?;
        c1.flush().await?;
        c2.recv_bytes(&mut [0; 5]).await?;
        assert_eq!(
            TransferCost {
                bytes_sent: 5,
                bytes_received: 0
            },
            a1.measure(&c1)
        );
        assert_eq!(
            TransferCost {
                bytes_sent: 0,
                bytes_received: 5
            },
            a2.measure(&c2)
        );
        assert_eq!(5, a1.measure(&c1).total());
        Ok(())
    }
}
