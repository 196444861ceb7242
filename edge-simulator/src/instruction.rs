//! Instruction model and parser for simulation traces.
//!
//! A trace is a sequence of whitespace-separated instructions, one per line.
//! The first token is a keyword mapped by a fixed table; the remaining
//! tokens form the instruction body:
//!
//! ```text
//! REQ|REQUEST     user_id node_id identifier
//! CON|CONNECT     user_id node_id
//! DCN|DISCONNECT  user_id node_id
//! ITERATION       iteration
//! REGISTER_NODE   node_id
//! GET_STATS
//! ```
//!
//! Unknown keywords and wrong arities are fatal and reported with the line
//! number. Formatting an instruction with `Display` produces the canonical
//! long form, which parses back to an equal instruction.

use std::fmt;

use thiserror::Error;

/// Error raised for a trace line that cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The keyword is not in the syntax table.
    #[error("line {line}: unknown instruction keyword `{keyword}`")]
    UnknownKeyword { line: u64, keyword: String },
    /// The instruction body has too few tokens.
    #[error("line {line}: {keyword} expects {expected} field(s)")]
    MissingField {
        line: u64,
        keyword: &'static str,
        expected: usize,
    },
    /// The iteration number is not a valid integer.
    #[error("line {line}: invalid iteration number `{value}`")]
    InvalidIteration { line: u64, value: String },
}

/// A single trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Advances the logical simulation tick.
    SetIteration { iteration: u64 },
    /// A user connects to a node.
    Connect { user_id: String, node_id: String },
    /// A user disconnects from a node.
    Disconnect { user_id: String, node_id: String },
    /// A user requests a content object at a node.
    Request {
        user_id: String,
        node_id: String,
        identifier: String,
    },
    /// Snapshot every node's metrics.
    CollectStatistics,
    /// Reserved; accepted and ignored by the runner.
    RegisterNode { node_id: String },
}

impl Instruction {
    /// Parses a single trace line.
    ///
    /// `line_no` is the 1-based line number used in error reports.
    pub fn parse(line: &str, line_no: u64) -> Result<Instruction, ParseError> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().unwrap_or("");

        let mut body = |keyword: &'static str, expected: usize| {
            let fields: Vec<&str> = (&mut tokens).take(expected).collect();
            if fields.len() < expected {
                Err(ParseError::MissingField {
                    line: line_no,
                    keyword,
                    expected,
                })
            } else {
                Ok(fields)
            }
        };

        match keyword {
            "REQ" | "REQUEST" => {
                let fields = body("REQUEST", 3)?;
                Ok(Instruction::Request {
                    user_id: fields[0].to_owned(),
                    node_id: fields[1].to_owned(),
                    identifier: fields[2].to_owned(),
                })
            }
            "CON" | "CONNECT" => {
                let fields = body("CONNECT", 2)?;
                Ok(Instruction::Connect {
                    user_id: fields[0].to_owned(),
                    node_id: fields[1].to_owned(),
                })
            }
            "DCN" | "DISCONNECT" => {
                let fields = body("DISCONNECT", 2)?;
                Ok(Instruction::Disconnect {
                    user_id: fields[0].to_owned(),
                    node_id: fields[1].to_owned(),
                })
            }
            "ITERATION" => {
                let fields = body("ITERATION", 1)?;
                let iteration =
                    fields[0]
                        .parse::<u64>()
                        .map_err(|_| ParseError::InvalidIteration {
                            line: line_no,
                            value: fields[0].to_owned(),
                        })?;
                Ok(Instruction::SetIteration { iteration })
            }
            "REGISTER_NODE" => {
                let fields = body("REGISTER_NODE", 1)?;
                Ok(Instruction::RegisterNode {
                    node_id: fields[0].to_owned(),
                })
            }
            "GET_STATS" => Ok(Instruction::CollectStatistics),
            other => Err(ParseError::UnknownKeyword {
                line: line_no,
                keyword: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::SetIteration { iteration } => write!(f, "ITERATION {iteration}"),
            Instruction::Connect { user_id, node_id } => write!(f, "CONNECT {user_id} {node_id}"),
            Instruction::Disconnect { user_id, node_id } => {
                write!(f, "DISCONNECT {user_id} {node_id}")
            }
            Instruction::Request {
                user_id,
                node_id,
                identifier,
            } => write!(f, "REQUEST {user_id} {node_id} {identifier}"),
            Instruction::CollectStatistics => write!(f, "GET_STATS"),
            Instruction::RegisterNode { node_id } => write!(f, "REGISTER_NODE {node_id}"),
        }
    }
}
