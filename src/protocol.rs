use std::num::ParseIntError;

/// Width of the name and surname fields on the wire.
pub const NAME_FIELD_SIZE: usize = 32;

/// One encoded bet: agency byte, two padded name fields, three u32 values.
pub const RECORD_SIZE: usize = 1 + 2 * NAME_FIELD_SIZE + 3 * 4;

/// Frame header: `[agency:u8][count:u8]`.
pub const FRAME_HEADER_SIZE: usize = 2;

/// Largest batch the one-byte count field can describe.
pub const MAX_BATCH_RECORDS: usize = u8::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("batch must contain at least one record")]
    EmptyBatch,

    #[error("batch of {0} records does not fit the one-byte count field")]
    BatchTooLarge(usize),

    #[error("winners payload truncated: expected {expected} bytes, got {actual}")]
    TruncatedWinners { expected: usize, actual: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("expected 5 comma-separated fields, got {0}")]
    FieldCount(usize),

    #[error("invalid {field} value {value:?}: {source}")]
    Numeric {
        field: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[error("invalid birth date {0:?}")]
    BirthDate(String),
}

/// One betting record. The numeric fields are validated at parse time so
/// that encoding is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub agency: u8,
    pub first_name: String,
    pub last_name: String,
    pub document: u32,
    /// Digits of "YYYY-MM-DD" with the hyphens stripped, as a base-10 value.
    pub birthdate: u32,
    pub number: u32,
}

impl Bet {
    /// Parses a `name,surname,document,birthdate,number` CSV line.
    pub fn parse(line: &str, agency: u8) -> Result<Self, ParseError> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 5 {
            return Err(ParseError::FieldCount(fields.len()));
        }

        Ok(Bet {
            agency,
            first_name: fields[0].to_string(),
            last_name: fields[1].to_string(),
            document: parse_numeric("document", fields[2])?,
            birthdate: parse_birthdate(fields[3])?,
            number: parse_numeric("number", fields[4])?,
        })
    }

    /// Encodes the bet into its fixed 77-byte layout. Names are truncated to
    /// 32 raw bytes or zero-padded; integers are little-endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        buf.push(self.agency);
        push_padded(&mut buf, self.first_name.as_bytes());
        push_padded(&mut buf, self.last_name.as_bytes());
        buf.extend_from_slice(&self.document.to_le_bytes());
        buf.extend_from_slice(&self.birthdate.to_le_bytes());
        buf.extend_from_slice(&self.number.to_le_bytes());
        debug_assert_eq!(buf.len(), RECORD_SIZE);
        buf
    }
}

fn parse_numeric(field: &'static str, value: &str) -> Result<u32, ParseError> {
    value.parse().map_err(|source| ParseError::Numeric {
        field,
        value: value.to_string(),
        source,
    })
}

fn parse_birthdate(text: &str) -> Result<u32, ParseError> {
    let digits: String = text.chars().filter(|c| *c != '-').collect();
    digits
        .parse()
        .map_err(|_| ParseError::BirthDate(text.to_string()))
}

fn push_padded(buf: &mut Vec<u8>, text: &[u8]) {
    let take = text.len().min(NAME_FIELD_SIZE);
    buf.extend_from_slice(&text[..take]);
    buf.resize(buf.len() + (NAME_FIELD_SIZE - take), 0);
}

/// Encodes `[agency:u8][count:u8]` followed by every record in input order.
pub fn encode_batch(agency: u8, bets: &[Bet]) -> Result<Vec<u8>, ProtocolError> {
    if bets.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    if bets.len() > MAX_BATCH_RECORDS {
        return Err(ProtocolError::BatchTooLarge(bets.len()));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + RECORD_SIZE * bets.len());
    frame.push(agency);
    frame.push(bets.len() as u8);
    for bet in bets {
        frame.extend_from_slice(&bet.encode());
    }
    Ok(frame)
}

/// The end-of-stream marker: a frame with a zero record count. The client
/// never sends an ordinary empty batch, so the sentinel is unambiguous.
pub fn encode_finished(agency: u8) -> [u8; FRAME_HEADER_SIZE] {
    [agency, 0]
}

/// Decodes the winners payload that follows the count byte: `count` packed
/// little-endian u32 document numbers.
pub fn decode_winner_documents(count: u8, payload: &[u8]) -> Result<Vec<u32>, ProtocolError> {
    let expected = count as usize * 4;
    if payload.len() != expected {
        return Err(ProtocolError::TruncatedWinners {
            expected,
            actual: payload.len(),
        });
    }

    Ok(payload
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
