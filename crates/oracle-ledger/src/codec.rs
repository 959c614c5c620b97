//! Line formats shared by the text ledgers.
//!
//! - Prediction ledger: `agent,direction,confidence,reasoning,timestamp\n`
//! - Reputation ledger: `agent,correct,total,percentage%\n`
//! - Reputation commit: `watermark <position> <anchor>\n` followed by the
//!   reputation ledger lines
//! - Market snapshot: `timestamp\n` followed by `symbol,price,change_percent\n`
//!
//! Fields are not quoted. Free text is escaped on write (commas become `;`,
//! line breaks become spaces) so every line written here splits back into
//! the same number of fields.

use std::borrow::Cow;
use std::str::FromStr;

use oracle_models::{
    Confidence, Direction, MarketSnapshot, PredictionRecord, ReputationBook, ReputationEntry,
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::RecordError;
use crate::store::Watermark;

pub const FIELD_DELIMITER: char = ',';
pub const PREDICTION_FIELDS: usize = 5;
pub const REPUTATION_MIN_FIELDS: usize = 3;

/// Replace characters that would break the line format.
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([FIELD_DELIMITER, '\n', '\r']) {
        Cow::Owned(
            value
                .chars()
                .map(|c| match c {
                    ',' => ';',
                    '\n' | '\r' => ' ',
                    other => other,
                })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}

/// Serialize a prediction as one ledger line, including the trailing newline.
pub fn encode_prediction(record: &PredictionRecord) -> String {
    let agent = escape_field(&record.agent);
    let reasoning = escape_field(&record.reasoning);
    let timestamp = escape_field(&record.timestamp);

    if matches!(reasoning, Cow::Owned(_)) {
        warn!(
            agent = %record.agent,
            "Reasoning contained delimiter or line break characters; escaped before append"
        );
    }

    format!(
        "{agent},{},{},{reasoning},{timestamp}\n",
        record.direction, record.confidence
    )
}

/// Parse one prediction ledger line.
///
/// Lines with more than five fields come from writers that did not escape
/// the reasoning text. The first three fields and the last one are fixed,
/// so everything in between is joined back into the reasoning.
pub fn decode_prediction(line: &str) -> Result<PredictionRecord, RecordError> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();

    if fields.len() < PREDICTION_FIELDS {
        return Err(RecordError::FieldCount {
            expected: PREDICTION_FIELDS,
            found: fields.len(),
        });
    }

    let agent = fields[0];
    if agent.is_empty() {
        return Err(RecordError::EmptyAgent);
    }

    let direction: Direction = fields[1].parse()?;
    let confidence: Confidence = fields[2].parse()?;

    let last = fields.len() - 1;
    let reasoning = if fields.len() > PREDICTION_FIELDS {
        debug!(
            agent,
            extra_fields = fields.len() - PREDICTION_FIELDS,
            "Rejoining unescaped reasoning text"
        );
        fields[3..last].join(",")
    } else {
        fields[3].to_string()
    };

    Ok(PredictionRecord {
        agent: agent.to_string(),
        direction,
        confidence,
        reasoning,
        timestamp: fields[last].to_string(),
    })
}

/// Serialize one reputation entry. The percentage is informational only.
pub fn encode_reputation(entry: &ReputationEntry) -> String {
    format!(
        "{},{},{},{:.1}%\n",
        escape_field(entry.agent()),
        entry.correct(),
        entry.total(),
        entry.accuracy()
    )
}

/// Parse one reputation ledger line. Any fourth field is ignored and the
/// percentage is recomputed from the counts.
pub fn decode_reputation(line: &str) -> Result<ReputationEntry, RecordError> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();

    if fields.len() < REPUTATION_MIN_FIELDS {
        return Err(RecordError::FieldCount {
            expected: REPUTATION_MIN_FIELDS,
            found: fields.len(),
        });
    }

    let agent = fields[0];
    if agent.is_empty() {
        return Err(RecordError::EmptyAgent);
    }

    let correct = parse_count("correct", fields[1])?;
    let total = parse_count("total", fields[2])?;

    ReputationEntry::from_counts(agent, correct, total)
        .ok_or(RecordError::Inconsistent { correct, total })
}

fn parse_count(field: &'static str, value: &str) -> Result<u64, RecordError> {
    value.trim().parse().map_err(|_| RecordError::Number {
        field,
        value: value.to_string(),
    })
}

/// Serialize a whole book in reputation ledger format, ordered by agent.
pub fn encode_book(book: &ReputationBook) -> String {
    book.iter().map(encode_reputation).collect()
}

const COMMIT_HEADER: &str = "watermark";
const NO_ANCHOR: &str = "-";

/// A committed reputation book and the watermark it was scored up to.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub watermark: Watermark,
    /// `None` for the bare-offset format, which recorded no book.
    pub book: Option<ReputationBook>,
}

/// Serialize a commit record. The anchor is written as 16 hex digits, or
/// `-` when the watermark has none.
pub fn encode_commit(book: &ReputationBook, watermark: Watermark) -> String {
    let anchor = watermark
        .anchor
        .map_or_else(|| NO_ANCHOR.to_string(), |a| format!("{a:016x}"));
    format!(
        "{COMMIT_HEADER} {} {anchor}\n{}",
        watermark.position,
        encode_book(book)
    )
}

/// Parse a commit record. A file holding only a decimal offset is read as a
/// watermark without a book. Unlike the ledgers, any bad line fails the whole
/// record: a partly read commit would pair the watermark with the wrong book.
pub fn decode_commit(text: &str) -> Result<Commit, RecordError> {
    let bad_header = |value: &str| RecordError::Number {
        field: "watermark",
        value: value.to_string(),
    };

    let mut lines = text.lines();
    let header = lines.next().map(str::trim).unwrap_or_default();

    if let Ok(position) = header.parse::<u64>() {
        return Ok(Commit {
            watermark: Watermark::at(position),
            book: None,
        });
    }

    let tokens: Vec<&str> = header.split_whitespace().collect();
    let [COMMIT_HEADER, position, anchor] = tokens[..] else {
        return Err(bad_header(header));
    };
    let position: u64 = position.parse().map_err(|_| bad_header(header))?;
    let watermark = if anchor == NO_ANCHOR {
        Watermark::at(position)
    } else {
        let anchor = u64::from_str_radix(anchor, 16).map_err(|_| bad_header(header))?;
        Watermark::anchored(position, anchor)
    };

    let mut book = ReputationBook::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        book.insert(decode_reputation(line)?);
    }

    Ok(Commit {
        watermark,
        book: Some(book),
    })
}

/// Serialize the market snapshot file contents.
pub fn encode_snapshot(snapshot: &MarketSnapshot) -> String {
    format!(
        "{}\n{},{},{}\n",
        escape_field(&snapshot.timestamp),
        escape_field(&snapshot.symbol),
        snapshot.price,
        escape_field(&snapshot.change_percent)
    )
}

/// Parse the market snapshot file contents.
pub fn decode_snapshot(text: &str) -> Result<MarketSnapshot, RecordError> {
    let mut lines = text.lines();
    let timestamp = lines.next().map(str::trim).unwrap_or_default();
    let data_line = lines.next().map(str::trim).unwrap_or_default();

    let fields: Vec<&str> = data_line.split(FIELD_DELIMITER).collect();
    if fields.len() != 3 {
        return Err(RecordError::FieldCount {
            expected: 3,
            found: fields.len(),
        });
    }

    let price = Decimal::from_str(fields[1].trim()).map_err(|_| RecordError::Number {
        field: "price",
        value: fields[1].to_string(),
    })?;

    Ok(MarketSnapshot {
        timestamp: timestamp.to_string(),
        symbol: fields[0].to_string(),
        price,
        change_percent: fields[2].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(reasoning: &str) -> PredictionRecord {
        PredictionRecord::new(
            "TechnicalAnalyst",
            Direction::Up,
            Confidence::High,
            reasoning,
            "2026-01-14T15:30:00+00:00",
        )
    }

    #[test]
    fn encode_prediction_exact_format() {
        let line = encode_prediction(&record("Momentum is strong"));
        assert_eq!(
            line,
            "TechnicalAnalyst,UP,HIGH,Momentum is strong,2026-01-14T15:30:00+00:00\n"
        );
    }

    #[test]
    fn encode_prediction_escapes_commas_and_newlines() {
        let line = encode_prediction(&record("RSI low, MACD rising\nbuy"));
        assert_eq!(line.matches(',').count(), PREDICTION_FIELDS - 1);
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("RSI low; MACD rising buy"));
    }

    #[test]
    fn decode_prediction_line() {
        let parsed = decode_prediction(
            "SentimentAnalyst,DOWN,LOW,Fed worries weigh,2026-01-14T10:22:33.123456\n",
        )
        .unwrap();
        assert_eq!(parsed.agent, "SentimentAnalyst");
        assert_eq!(parsed.direction, Direction::Down);
        assert_eq!(parsed.confidence, Confidence::Low);
        assert_eq!(parsed.reasoning, "Fed worries weigh");
        assert_eq!(parsed.timestamp, "2026-01-14T10:22:33.123456");
    }

    #[test]
    fn decode_prediction_rejoins_unescaped_reasoning() {
        let parsed =
            decode_prediction("A,UP,MEDIUM,first, second, third,2026-01-14T10:00:00").unwrap();
        assert_eq!(parsed.reasoning, "first, second, third");
        assert_eq!(parsed.timestamp, "2026-01-14T10:00:00");
    }

    #[test]
    fn decode_prediction_too_few_fields() {
        let err = decode_prediction("A,UP,HIGH,truncated").unwrap_err();
        assert_eq!(
            err,
            RecordError::FieldCount {
                expected: 5,
                found: 4
            }
        );
    }

    #[test]
    fn decode_prediction_unknown_direction() {
        let err = decode_prediction("A,SIDEWAYS,HIGH,flat,2026-01-14").unwrap_err();
        assert!(matches!(err, RecordError::Token(_)));
    }

    #[test]
    fn decode_prediction_empty_agent() {
        let err = decode_prediction(",UP,HIGH,x,2026-01-14").unwrap_err();
        assert_eq!(err, RecordError::EmptyAgent);
    }

    #[test]
    fn prediction_line_roundtrip_after_escape() {
        let original = record("Breakout above resistance, volume confirms");
        let parsed = decode_prediction(&encode_prediction(&original)).unwrap();
        assert_eq!(parsed.reasoning, "Breakout above resistance; volume confirms");
        assert_eq!(parsed.direction, original.direction);
        assert_eq!(parsed.timestamp, original.timestamp);
    }

    #[test]
    fn encode_reputation_formats_percentage() {
        let entry = ReputationEntry::from_counts("A", 2, 3).unwrap();
        assert_eq!(encode_reputation(&entry), "A,2,3,66.7%\n");

        let empty = ReputationEntry::new("B");
        assert_eq!(encode_reputation(&empty), "B,0,0,0.0%\n");
    }

    #[test]
    fn decode_reputation_ignores_stored_percentage() {
        let entry = decode_reputation("A,3,4,12.0%").unwrap();
        assert_eq!(entry.correct(), 3);
        assert_eq!(entry.total(), 4);
        assert_eq!(entry.accuracy(), 75.0);
    }

    #[test]
    fn decode_reputation_three_fields() {
        let entry = decode_reputation("A,0,7").unwrap();
        assert_eq!(entry.total(), 7);
    }

    #[test]
    fn decode_reputation_rejects_bad_numbers() {
        assert!(matches!(
            decode_reputation("A,three,4"),
            Err(RecordError::Number {
                field: "correct",
                ..
            })
        ));
        assert!(matches!(
            decode_reputation("A,1,-4"),
            Err(RecordError::Number { field: "total", .. })
        ));
        assert_eq!(
            decode_reputation("A,5,4").unwrap_err(),
            RecordError::Inconsistent {
                correct: 5,
                total: 4
            }
        );
        assert!(matches!(
            decode_reputation("A,5"),
            Err(RecordError::FieldCount { .. })
        ));
    }

    #[test]
    fn commit_record_carries_watermark_and_book() {
        let book: ReputationBook = vec![
            ReputationEntry::from_counts("B", 0, 1).unwrap(),
            ReputationEntry::from_counts("A", 1, 1).unwrap(),
        ]
        .into_iter()
        .collect();
        let watermark = Watermark::anchored(96, 0xdead_beef);

        let text = encode_commit(&book, watermark);
        assert_eq!(
            text,
            "watermark 96 00000000deadbeef\nA,1,1,100.0%\nB,0,1,0.0%\n"
        );

        let commit = decode_commit(&text).unwrap();
        assert_eq!(commit.watermark, watermark);
        assert_eq!(commit.book, Some(book));
    }

    #[test]
    fn commit_record_without_anchor_or_book() {
        let commit = decode_commit("watermark 0 -\n").unwrap();
        assert_eq!(commit.watermark, Watermark::START);
        assert_eq!(commit.book, Some(ReputationBook::new()));

        // Bare offsets carry no book
        let commit = decode_commit("412\n").unwrap();
        assert_eq!(commit.watermark, Watermark::at(412));
        assert!(commit.book.is_none());
    }

    #[test]
    fn commit_record_rejects_damage() {
        assert!(matches!(
            decode_commit("not-a-number\n"),
            Err(RecordError::Number {
                field: "watermark",
                ..
            })
        ));
        assert!(decode_commit("watermark 12 zz\n").is_err());
        assert!(decode_commit("watermark 12\n").is_err());
        assert_eq!(
            decode_commit("watermark 12 -\nA,5,4,125.0%\n").unwrap_err(),
            RecordError::Inconsistent {
                correct: 5,
                total: 4
            }
        );
    }

    #[test]
    fn snapshot_roundtrip() {
        let snapshot = MarketSnapshot {
            timestamp: "2026-01-14T15:30:00+00:00".to_string(),
            symbol: "SPY".to_string(),
            price: dec!(693.77),
            change_percent: "-0.2000%".to_string(),
        };
        let text = encode_snapshot(&snapshot);
        assert_eq!(text, "2026-01-14T15:30:00+00:00\nSPY,693.77,-0.2000%\n");
        assert_eq!(decode_snapshot(&text).unwrap(), snapshot);
    }

    #[test]
    fn snapshot_rejects_bad_price() {
        let err = decode_snapshot("2026-01-14\nSPY,N/A,0.1%\n").unwrap_err();
        assert!(matches!(err, RecordError::Number { field: "price", .. }));
    }

    #[test]
    fn snapshot_rejects_missing_data_line() {
        assert!(decode_snapshot("2026-01-14\n").is_err());
    }
}
