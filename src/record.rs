//! Typed lines of the two traces.

use crate::error::LineError;
use crate::{NodeId, Sequence, Timestamp};
use std::str::FromStr;

/// A data packet as seen end to end.
///
/// `t3` is the source send time, `t8` the delivery time (0 when dropped),
/// `t1` the control update the packet was addressed with, `t2`, `t4`, `t7`
/// forwarder-side timestamps (`t2 == 0` when absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRecord {
    pub node: NodeId,
    pub t3: Timestamp,
    pub t8: Timestamp,
    pub t1: Timestamp,
    pub t2: Timestamp,
    pub t4: Timestamp,
    pub t5: Timestamp,
    pub t7: Timestamp,
}

impl DataRecord {
    pub fn is_dropped(&self) -> bool {
        self.t8 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryRecord {
    /// `1 <node> <send-time>`
    Control { node: NodeId, send_time: Timestamp },
    /// `0 <node> <t3> <t8> <t1> <t2> <t4> <t5> <t7>`
    Data(DataRecord),
}

impl DeliveryRecord {
    pub fn node(&self) -> NodeId {
        match self {
            DeliveryRecord::Control { node, .. } => *node,
            DeliveryRecord::Data(data) => data.node,
        }
    }
}

fn number<T: FromStr>(parts: &[&str], index: usize, field: &'static str) -> Result<T, LineError> {
    parts[index].parse().map_err(|_| LineError::InvalidNumber {
        field,
        value: parts[index].to_string(),
    })
}

fn require(parts: &[&str], kind: &'static str, expected: usize) -> Result<(), LineError> {
    if parts.len() < expected {
        return Err(LineError::TooFewFields {
            kind,
            expected,
            found: parts.len(),
        });
    }
    Ok(())
}

/// Node id and send time, the first fields every delivery line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHead {
    pub node: NodeId,
    pub send_time: Timestamp,
}

impl LineHead {
    fn parse(parts: &[&str]) -> Result<Self, LineError> {
        Ok(Self {
            node: number(parts, 1, "node_id")?,
            send_time: number(parts, 2, "send_time")?,
        })
    }
}

/// A delivery line that cannot be used as a record. `head` is set when the
/// node id and send time still parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub head: Option<LineHead>,
    pub error: LineError,
}

impl DeliveryRecord {
    pub fn parse(line: &str) -> Result<Self, MalformedLine> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        require(&parts, "line", 3).map_err(|error| MalformedLine { head: None, error })?;
        let head = LineHead::parse(&parts).map_err(|error| MalformedLine { head: None, error })?;
        let malformed = |error| MalformedLine {
            head: Some(head),
            error,
        };
        match parts[0] {
            "1" => Ok(DeliveryRecord::Control {
                node: head.node,
                send_time: head.send_time,
            }),
            "0" => {
                require(&parts, "data", 9).map_err(malformed)?;
                let field = |index, name| number(&parts, index, name).map_err(malformed);
                Ok(DeliveryRecord::Data(DataRecord {
                    node: head.node,
                    t3: head.send_time,
                    t8: field(3, "t8")?,
                    t1: field(4, "t1")?,
                    t2: field(5, "t2")?,
                    t4: field(6, "t4")?,
                    t5: field(7, "t5")?,
                    t7: field(8, "t7")?,
                }))
            }
            tag => Err(malformed(LineError::UnknownTag(tag.to_string()))),
        }
    }
}

impl FromStr for DeliveryRecord {
    type Err = LineError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        DeliveryRecord::parse(line).map_err(|malformed| malformed.error)
    }
}

/// One event of the allocation trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocEvent {
    /// `A <seq>`: the control packet whose FIB entry is added this round.
    Allocate(Sequence),
    /// `F <seq>`: an entry freed this round, `0` for a node's first entry.
    Free(Sequence),
    /// `T <time>`: commits the round.
    Commit(Timestamp),
}

impl FromStr for AllocEvent {
    type Err = LineError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        require(&parts, "event", 2)?;
        match parts[0] {
            "A" => Ok(AllocEvent::Allocate(number(&parts, 1, "seq")?)),
            "F" => Ok(AllocEvent::Free(number(&parts, 1, "seq")?)),
            "T" => Ok(AllocEvent::Commit(number(&parts, 1, "time")?)),
            tag => Err(LineError::UnknownTag(tag.to_string())),
        }
    }
}
