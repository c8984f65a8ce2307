use crate::Result;
use crate::blocks::common::{BlockHeader, BlockParse, read_f64, read_u16, read_u32, validate_buffer_size};

/// One trigger event: trigger time plus pre/post trigger intervals, seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub time: f64,
    pub pre_time: f64,
    pub post_time: f64,
}

/// TRBLOCK: trigger events attached to a data group.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerBlock {
    pub header: BlockHeader,
    pub comment_addr: u32,
    pub events: Vec<TriggerEvent>,
}

impl TriggerBlock {
    pub fn new(events: Vec<TriggerEvent>) -> Self {
        TriggerBlock {
            header: BlockHeader::new("TR", (10 + 24 * events.len()) as u16),
            comment_addr: 0,
            events,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let size = 10 + 24 * self.events.len();
        let mut buffer = BlockHeader::new("TR", size as u16).to_bytes();
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&(self.events.len() as u16).to_le_bytes());
        for ev in &self.events {
            buffer.extend_from_slice(&ev.time.to_le_bytes());
            buffer.extend_from_slice(&ev.pre_time.to_le_bytes());
            buffer.extend_from_slice(&ev.post_time.to_le_bytes());
        }
        buffer
    }
}

impl BlockParse<'_> for TriggerBlock {
    const ID: &'static str = "TR";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 10)?;
        let comment_addr = read_u32(bytes, 4);
        let count = read_u16(bytes, 8) as usize;
        validate_buffer_size(bytes, 10 + 24 * count)?;
        let mut events = Vec::with_capacity(count);
        for i in 0..count {
            let base = 10 + 24 * i;
            events.push(TriggerEvent {
                time: read_f64(bytes, base),
                pre_time: read_f64(bytes, base + 8),
                post_time: read_f64(bytes, base + 16),
            });
        }
        Ok(Self {
            header,
            comment_addr,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_roundtrip() {
        let tr = TriggerBlock::new(vec![
            TriggerEvent {
                time: 1.5,
                pre_time: 0.5,
                post_time: 2.0,
            },
            TriggerEvent {
                time: 9.0,
                pre_time: 0.0,
                post_time: 0.0,
            },
        ]);
        let parsed = TriggerBlock::from_bytes(&tr.to_bytes()).unwrap();
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[0].time, 1.5);
        assert_eq!(parsed.events[1].time, 9.0);
    }
}
