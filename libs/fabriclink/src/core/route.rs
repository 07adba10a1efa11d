//! Route segments and the route table describing one end-to-end data path.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::control::{HOST_NODE, NODE_COUNT};
use super::error::{FabricError, Result};

/// One directed hop: bytes leaving `src_node`'s `src_fifo` arrive at
/// `dst_node`'s `dst_fifo`. Node 0 is the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteSegment {
    pub src_node: u8,
    pub src_fifo: u8,
    pub dst_node: u8,
    pub dst_fifo: u8,
}

impl RouteSegment {
    pub fn new(src_node: u8, src_fifo: u8, dst_node: u8, dst_fifo: u8) -> Self {
        Self {
            src_node,
            src_fifo,
            dst_node,
            dst_fifo,
        }
    }
}

impl fmt::Display for RouteSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}->{}.{}",
            self.src_node, self.src_fifo, self.dst_node, self.dst_fifo
        )
    }
}

impl FromStr for RouteSegment {
    type Err = FabricError;

    /// Parses "srcNode,srcFifo,dstNode,dstFifo". Any run of non-digit
    /// characters separates fields, so "0.1->2.0" parses the same way.
    fn from_str(s: &str) -> Result<Self> {
        const FIELDS: [&str; 4] = ["src_node", "src_fifo", "dst_node", "dst_fifo"];

        let mut values = [0u8; 4];
        let mut fields = s
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty());
        for (slot, what) in values.iter_mut().zip(FIELDS) {
            let field = fields.next().ok_or_else(|| FabricError::Parse {
                input: s.to_string(),
                what,
            })?;
            *slot = field.parse().map_err(|_| FabricError::Parse {
                input: s.to_string(),
                what,
            })?;
        }
        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }
}

/// Ordered list of route segments.
///
/// The chain builder produces tables forming exactly one linear chain from
/// the host out through each programmed node and back; [`validate`] checks
/// that shape. Hand-assembled tables (the `route add` command) may hold
/// arbitrary segments and are installed without chain validation.
///
/// [`validate`]: RouteTable::validate
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteTable {
    segments: Vec<RouteSegment>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: RouteSegment) {
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteSegment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Checks that the table forms one unbroken host-to-host chain.
    ///
    /// - the first segment leaves the host, the last one returns to it
    /// - every intermediate endpoint is a hardware node
    /// - consecutive segments share their meeting endpoint
    /// - node and fifo ids are in range
    /// - no endpoint is used twice as source, or twice as destination
    pub fn validate(&self) -> Result<()> {
        let first = self
            .segments
            .first()
            .ok_or_else(|| FabricError::Route("empty table".into()))?;
        if first.src_node != HOST_NODE {
            return Err(FabricError::Route(format!(
                "chain starts at node {}, not the host",
                first.src_node
            )));
        }
        let last = self.segments[self.segments.len() - 1];
        if last.dst_node != HOST_NODE {
            return Err(FabricError::Route(format!(
                "chain ends at node {}, not the host",
                last.dst_node
            )));
        }

        let mut sources = Vec::with_capacity(self.segments.len());
        let mut destinations = Vec::with_capacity(self.segments.len());
        let mut previous: Option<&RouteSegment> = None;
        for segment in &self.segments {
            for (id, what) in [
                (segment.src_node, "source node"),
                (segment.dst_node, "destination node"),
                (segment.src_fifo, "source fifo"),
                (segment.dst_fifo, "destination fifo"),
            ] {
                if id >= NODE_COUNT {
                    return Err(FabricError::Route(format!(
                        "{what} {id} out of range in {segment}"
                    )));
                }
            }
            if let Some(previous) = previous {
                if (previous.dst_node, previous.dst_fifo) != (segment.src_node, segment.src_fifo) {
                    return Err(FabricError::Route(format!(
                        "chain breaks between {previous} and {segment}"
                    )));
                }
                if segment.src_node == HOST_NODE {
                    return Err(FabricError::Route(format!(
                        "chain returns to the host before {segment}"
                    )));
                }
            }
            let source = (segment.src_node, segment.src_fifo);
            let destination = (segment.dst_node, segment.dst_fifo);
            if sources.contains(&source) {
                return Err(FabricError::Route(format!(
                    "fifo {}.{} used twice as source",
                    source.0, source.1
                )));
            }
            if destinations.contains(&destination) {
                return Err(FabricError::Route(format!(
                    "fifo {}.{} used twice as destination",
                    destination.0, destination.1
                )));
            }
            sources.push(source);
            destinations.push(destination);
            previous = Some(segment);
        }
        Ok(())
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a RouteSegment;
    type IntoIter = std::slice::Iter<'a, RouteSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(hops: &[(u8, u8)]) -> RouteTable {
        let mut table = RouteTable::new();
        for pair in hops.windows(2) {
            table.push(RouteSegment::new(pair[0].0, pair[0].1, pair[1].0, pair[1].1));
        }
        table
    }

    #[test]
    fn test_display() {
        let segment = RouteSegment::new(0, 1, 2, 0);
        assert_eq!(segment.to_string(), "0.1->2.0");
    }

    #[test]
    fn test_parse_comma_separated() {
        let segment: RouteSegment = "1,2,3,4".parse().unwrap();
        assert_eq!(segment, RouteSegment::new(1, 2, 3, 4));
    }

    #[test]
    fn test_parse_display_form() {
        let segment: RouteSegment = "0.1->2.0".parse().unwrap();
        assert_eq!(segment, RouteSegment::new(0, 1, 2, 0));
    }

    #[test]
    fn test_parse_missing_field() {
        let err = "1,2,3".parse::<RouteSegment>().unwrap_err();
        assert!(err.to_string().contains("dst_fifo"));
    }

    #[test]
    fn test_parse_value_out_of_range() {
        let err = "1,2,300,4".parse::<RouteSegment>().unwrap_err();
        assert!(err.to_string().contains("dst_node"));
    }

    #[test]
    fn test_validate_single_hop() {
        // Host write channel straight back to the host read channel.
        chain(&[(0, 3), (0, 4)]).validate().unwrap();
    }

    #[test]
    fn test_validate_linear_chain() {
        chain(&[(0, 0), (2, 0), (5, 0), (0, 1)]).validate().unwrap();
    }

    #[test]
    fn test_validate_empty() {
        assert!(RouteTable::new().validate().is_err());
    }

    #[test]
    fn test_validate_must_start_at_host() {
        let err = chain(&[(1, 0), (2, 0), (0, 0)]).validate().unwrap_err();
        assert!(err.to_string().contains("starts"));
    }

    #[test]
    fn test_validate_must_end_at_host() {
        let err = chain(&[(0, 0), (2, 0), (3, 0)]).validate().unwrap_err();
        assert!(err.to_string().contains("ends"));
    }

    #[test]
    fn test_validate_broken_chain() {
        let mut table = RouteTable::new();
        table.push(RouteSegment::new(0, 0, 2, 0));
        table.push(RouteSegment::new(3, 0, 0, 1));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_cycle() {
        // 2.0 feeds 3.0 which feeds 2.0 again: 2.0 is a destination twice.
        let mut table = RouteTable::new();
        table.push(RouteSegment::new(0, 0, 2, 0));
        table.push(RouteSegment::new(2, 0, 3, 0));
        table.push(RouteSegment::new(3, 0, 2, 0));
        table.push(RouteSegment::new(2, 0, 0, 1));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_fifo_out_of_range() {
        let mut table = RouteTable::new();
        table.push(RouteSegment::new(0, 32, 2, 0));
        table.push(RouteSegment::new(2, 0, 0, 1));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_table_display() {
        let table = chain(&[(0, 0), (2, 0), (0, 1)]);
        assert_eq!(table.to_string(), "0.0->2.0 2.0->0.1");
    }
}
