// Bucketed L4 port usage bitmaps (TCP/UDP, source/destination)

use crate::models::PortBucketBitmap;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Number of port buckets; each covers `65536 / BUCKET_COUNT` ports.
pub const BUCKET_COUNT: usize = 256;
const PORTS_PER_BUCKET: usize = (u16::MAX as usize + 1) / BUCKET_COUNT;
const BITS_PER_WORD: usize = u32::BITS as usize;
pub const WORD_COUNT: usize = BUCKET_COUNT / BITS_PER_WORD;

/// Bitmap for one protocol/direction. Tracks the words last handed out by
/// [`PortBitmap::sync`] so callers only send changes.
#[derive(Debug, Clone)]
pub struct PortBitmap {
    words: [u32; WORD_COUNT],
    counts: [u32; BUCKET_COUNT],
    synced: [u32; WORD_COUNT],
}

impl Default for PortBitmap {
    fn default() -> Self {
        Self {
            words: [0; WORD_COUNT],
            counts: [0; BUCKET_COUNT],
            synced: [0; WORD_COUNT],
        }
    }
}

impl PortBitmap {
    pub fn add_port(&mut self, port: u16) {
        let bucket = port as usize / PORTS_PER_BUCKET;
        if self.counts[bucket] == 0 {
            self.words[bucket / BITS_PER_WORD] |= 1 << (bucket % BITS_PER_WORD);
        }
        self.counts[bucket] = self.counts[bucket].saturating_add(1);
    }

    /// Number of ports marked in the bucket holding `port`.
    pub fn hits(&self, port: u16) -> u32 {
        self.counts[port as usize / PORTS_PER_BUCKET]
    }

    pub fn encode(&self) -> Vec<u32> {
        self.words.to_vec()
    }

    /// Returns the full bitmap if it differs from the previous sync, and
    /// records it as synced.
    pub fn sync(&mut self) -> Option<Vec<u32>> {
        if self.words == self.synced {
            return None;
        }
        self.synced = self.words;
        Some(self.encode())
    }
}

/// The four port bitmaps kept per VM and per interface.
#[derive(Debug, Clone, Default)]
pub struct L4PortBitmap {
    pub tcp_sport: PortBitmap,
    pub tcp_dport: PortBitmap,
    pub udp_sport: PortBitmap,
    pub udp_dport: PortBitmap,
}

/// Changed words per map, as produced by [`L4PortBitmap::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBitmapDiff {
    pub tcp_sport: Option<Vec<u32>>,
    pub tcp_dport: Option<Vec<u32>>,
    pub udp_sport: Option<Vec<u32>>,
    pub udp_dport: Option<Vec<u32>>,
}

impl PortBitmapDiff {
    pub fn is_empty(&self) -> bool {
        self.tcp_sport.is_none()
            && self.tcp_dport.is_none()
            && self.udp_sport.is_none()
            && self.udp_dport.is_none()
    }
}

impl L4PortBitmap {
    /// Marks a port pair. Only TCP and UDP are tracked.
    pub fn add_port(&mut self, proto: u8, sport: u16, dport: u16) {
        match proto {
            IPPROTO_TCP => {
                self.tcp_sport.add_port(sport);
                self.tcp_dport.add_port(dport);
            }
            IPPROTO_UDP => {
                self.udp_sport.add_port(sport);
                self.udp_dport.add_port(dport);
            }
            _ => {}
        }
    }

    pub fn encode(&self) -> PortBucketBitmap {
        PortBucketBitmap {
            tcp_sport_bitmap: self.tcp_sport.encode(),
            tcp_dport_bitmap: self.tcp_dport.encode(),
            udp_sport_bitmap: self.udp_sport.encode(),
            udp_dport_bitmap: self.udp_dport.encode(),
        }
    }

    pub fn sync(&mut self) -> PortBitmapDiff {
        PortBitmapDiff {
            tcp_sport: self.tcp_sport.sync(),
            tcp_dport: self.tcp_dport.sync(),
            udp_sport: self.udp_sport.sync(),
            udp_dport: self.udp_dport.sync(),
        }
    }
}
