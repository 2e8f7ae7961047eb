use std::{
    io,
    net::{IpAddr, SocketAddr, UdpSocket},
    ops::Range,
    str::FromStr,
};

use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A contiguous UDP port range, configured as e.g. `"49152..65535"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn size(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    pub fn start(&self) -> u16 {
        self.start
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 49152,
            end: 65535,
        }
    }
}

impl From<Range<u16>> for PortRange {
    fn from(range: Range<u16>) -> Self {
        assert!(range.start <= range.end);

        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl ToString for PortRange {
    fn to_string(&self) -> String {
        format!("{}..{}", self.start, self.end)
    }
}

#[derive(Debug)]
pub struct PortRangeParseError(String);

impl std::error::Error for PortRangeParseError {}

impl std::fmt::Display for PortRangeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<std::num::ParseIntError> for PortRangeParseError {
    fn from(error: std::num::ParseIntError) -> Self {
        PortRangeParseError(error.to_string())
    }
}

impl FromStr for PortRange {
    type Err = PortRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| PortRangeParseError(s.to_string()))?;

        Ok(Self {
            start: start.parse()?,
            end: end.parse()?,
        })
    }
}

#[cfg(feature = "serde")]
impl Serialize for PortRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(|e| serde::de::Error::custom(e.0))
    }
}

/// Bit flag used when marking a port offset in a [`PortAllocator`] bucket.
#[derive(PartialEq, Eq)]
pub enum Bit {
    Low,
    High,
}

/// Bitset-backed allocator over a [`PortRange`].
///
/// One bit per offset in the range; a set bit means the port at that offset
/// is currently reserved. Single-port allocation finds the first free bit
/// with a randomized starting bucket; [`PortAllocator::alloc_run`] finds a
/// contiguous run of free bits, since the Port Reserver prefers to hand out
/// adjacent ports across a Component's local interfaces.
pub struct PortAllocator {
    port_range: PortRange,
    buckets: Vec<u64>,
    allocated: usize,
    bit_len: u32,
    max_offset: usize,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(PortRange::default())
    }
}

impl PortAllocator {
    pub fn new(port_range: PortRange) -> Self {
        let capacity = port_range.size();
        let bucket_size = (capacity as f32 / 64.0).ceil() as usize;

        Self {
            bit_len: (capacity as f32 % 64.0).ceil() as u32,
            buckets: vec![0; bucket_size],
            max_offset: bucket_size - 1,
            allocated: 0,
            port_range,
        }
    }

    pub fn capacity(&self) -> usize {
        self.port_range.size()
    }

    pub fn port_range(&self) -> &PortRange {
        &self.port_range
    }

    pub fn len(&self) -> usize {
        self.allocated
    }

    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// # Test
    ///
    /// ```
    /// use ice_agent_ice::port_reserver::*;
    ///
    /// let mut pool = PortAllocator::default();
    ///
    /// assert_eq!(pool.alloc(Some(0)), Some(49152));
    /// assert_eq!(pool.alloc(Some(0)), Some(49153));
    ///
    /// assert!(pool.alloc(None).is_some());
    /// ```
    pub fn alloc(&mut self, start: Option<usize>) -> Option<u16> {
        let mut index = None;
        let mut offset =
            start.unwrap_or_else(|| rand::rng().random_range(0..self.max_offset.max(1)));

        let previous = if offset == 0 {
            self.max_offset
        } else {
            offset - 1
        };

        loop {
            if let Some(i) = {
                let bucket = self.buckets[offset];
                if bucket < u64::MAX {
                    let idx = bucket.leading_ones();
                    if offset == self.max_offset && idx > self.bit_len {
                        None
                    } else {
                        Some(idx)
                    }
                } else {
                    None
                }
            } {
                index = Some(i as usize);
                break;
            }

            if offset == self.max_offset {
                offset = 0;
            } else {
                offset += 1;
            }

            if offset == previous {
                break;
            }
        }

        let index = index?;
        self.set_bit(offset, index, Bit::High);
        self.allocated += 1;

        let num = (offset * 64 + index) as u16;
        Some(self.port_range.start + num)
    }

    /// Find `count` consecutive free port offsets and reserve all of them.
    ///
    /// Returns the first port of the run. Unlike [`PortAllocator::alloc`],
    /// this scans linearly from the start of the range rather than from a
    /// random bucket, since a contiguous run is rare enough that randomizing
    /// the search start would rarely pay off.
    ///
    /// # Test
    ///
    /// ```
    /// use ice_agent_ice::port_reserver::*;
    ///
    /// let mut pool = PortAllocator::default();
    ///
    /// assert_eq!(pool.alloc_run(4), Some(49152));
    /// assert_eq!(pool.alloc_run(4), Some(49156));
    /// ```
    pub fn alloc_run(&mut self, count: usize) -> Option<u16> {
        if count == 0 || count > self.capacity() {
            return None;
        }

        let mut run_start = None;
        let mut run_len = 0usize;

        for offset in 0..=self.capacity() {
            let free = offset < self.capacity() && !self.bit(offset);

            if free {
                if run_len == 0 {
                    run_start = Some(offset);
                }
                run_len += 1;

                if run_len == count {
                    let start = run_start.unwrap();
                    for i in start..start + count {
                        let (bucket, index) = (i / 64, i % 64);
                        self.set_bit(bucket, index, Bit::High);
                    }
                    self.allocated += count;
                    return Some(self.port_range.start + start as u16);
                }
            } else {
                run_len = 0;
                run_start = None;
            }
        }

        None
    }

    fn bit(&self, offset: usize) -> bool {
        let (bucket, index) = (offset / 64, offset % 64);
        (self.buckets[bucket] & (1 << (63 - index))) != 0
    }

    pub fn set_bit(&mut self, bucket: usize, index: usize, bit: Bit) {
        let high_mask = 1 << (63 - index);
        let mask = match bit {
            Bit::Low => u64::MAX ^ high_mask,
            Bit::High => high_mask,
        };

        let value = self.buckets[bucket];
        self.buckets[bucket] = match bit {
            Bit::High => value | mask,
            Bit::Low => value & mask,
        };
    }

    /// # Test
    ///
    /// ```
    /// use ice_agent_ice::port_reserver::*;
    ///
    /// let mut pool = PortAllocator::default();
    ///
    /// assert_eq!(pool.alloc(Some(0)), Some(49152));
    /// assert_eq!(pool.alloc(Some(0)), Some(49153));
    ///
    /// pool.restore(49152);
    /// pool.restore(49153);
    ///
    /// assert_eq!(pool.alloc(Some(0)), Some(49152));
    /// assert_eq!(pool.alloc(Some(0)), Some(49153));
    /// ```
    pub fn restore(&mut self, port: u16) {
        assert!(self.port_range.contains(port));

        let offset = (port - self.port_range.start) as usize;
        let bucket = offset / 64;
        let index = offset - (bucket * 64);

        if !self.bit(offset) {
            return;
        }

        self.set_bit(bucket, index, Bit::Low);
        self.allocated -= 1;
    }
}

/// A port number bound on every configured local address.
pub struct ReservedPort {
    pub port: u16,
    pub sockets: Vec<(IpAddr, UdpSocket)>,
}

/// Pre-binds UDP sockets on every configured local address across a
/// contiguous port range.
///
/// A port is considered reserved only once it is bound on *every* address;
/// if binding fails on any address the partially-bound sockets for that
/// port are dropped (closing them) and the logical reservation is released.
pub struct PortReserver {
    addresses: Vec<IpAddr>,
    allocator: PortAllocator,
}

impl PortReserver {
    pub fn new(addresses: Vec<IpAddr>, range: PortRange) -> Self {
        Self {
            addresses,
            allocator: PortAllocator::new(range),
        }
    }

    /// Borrow `count` reserved ports, each bound on every configured
    /// address, preferring a single contiguous run. When no run of that
    /// length is available the request is split recursively into smaller
    /// runs until it can be satisfied or the range is exhausted.
    pub fn borrow_sockets(&mut self, count: usize) -> io::Result<Vec<ReservedPort>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        if let Some(reserved) = self.try_borrow_run(count) {
            return Ok(reserved);
        }

        if count == 1 {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                "no port available on every configured address",
            ));
        }

        let half = count / 2;
        let mut first = self.borrow_sockets(half)?;
        let mut rest = self.borrow_sockets(count - half)?;
        first.append(&mut rest);
        Ok(first)
    }

    fn try_borrow_run(&mut self, count: usize) -> Option<Vec<ReservedPort>> {
        let start_port = self.allocator.alloc_run(count)?;

        let mut reserved = Vec::with_capacity(count);
        for offset in 0..count {
            let port = start_port + offset as u16;

            let mut sockets = Vec::with_capacity(self.addresses.len());
            let mut failed = false;

            for &ip in &self.addresses {
                match UdpSocket::bind(SocketAddr::new(ip, port)) {
                    Ok(socket) => sockets.push((ip, socket)),
                    Err(_) => {
                        failed = true;
                        break;
                    }
                }
            }

            if failed {
                // release everything allocated so far in this run, including
                // the sockets already bound for this failing port.
                for i in 0..=offset {
                    self.allocator.restore(start_port + i as u16);
                }
                return None;
            }

            reserved.push(ReservedPort { port, sockets });
        }

        Some(reserved)
    }

    /// Return a reserved port's sockets to the pool, closing them.
    pub fn restore(&mut self, port: u16) {
        self.allocator.restore(port);
    }

    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }
}
