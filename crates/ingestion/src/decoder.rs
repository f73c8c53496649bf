//! Splitting file content into bulletins and messages.
//!
//! The full TAC/IWXXM grammars are out of scope here: [`TacBulletinDecoder`]
//! only extracts what the populator chain needs (type, location indicators,
//! issue time, validity).

use avi_common::{
    BulletinHeading, FileMetadata, GenericAviationMessage, InputAviationMessage, InputBulletinHeading,
    LocationIndicatorType, MessageFormat, MessageReference, MessageType, PartialDateTime,
    PartialOrCompleteTimeInstant, PartialOrCompleteTimePeriod,
};
use std::fmt;
use std::sync::Arc;

/// A problem decoding part of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub bulletin_index: usize,
    pub message_index: Option<usize>,
    pub reason: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_index {
            Some(message) => write!(f, "bulletin {} message {}: {}", self.bulletin_index + 1, message + 1, self.reason),
            None => write!(f, "bulletin {}: {}", self.bulletin_index + 1, self.reason),
        }
    }
}

/// Messages decoded from one file, in bulletin-then-message order.
#[derive(Debug, Clone, Default)]
pub struct DecodedFile {
    pub messages: Vec<InputAviationMessage>,
    pub errors: Vec<DecodeError>,
}

pub trait MessageDecoder: Send + Sync {
    fn decode(&self, content: &str, file_metadata: &Arc<FileMetadata>) -> DecodedFile;
}

const TYPE_KEYWORDS: &[&str] = &["METAR", "SPECI", "TAF", "SIGMET", "AIRMET", "GAMET", "ARS"];
const MODIFIERS: &[&str] = &["COR", "AMD", "CNL", "RTD"];

/// Decoder for TAC files holding one or more GTS bulletins.
#[derive(Debug, Default, Clone, Copy)]
pub struct TacBulletinDecoder;

struct Line<'a> {
    offset: usize,
    text: &'a str,
}

struct RawBulletin<'a> {
    heading: Option<Line<'a>>,
    lines: Vec<Line<'a>>,
}

struct RawMessage {
    offset: usize,
    text: String,
}

fn is_filler(line: &str) -> bool {
    line.is_empty() || line == "ZCZC" || line == "NNNN" || line.chars().all(|c| c.is_ascii_digit())
}

fn trim_line(line: &str) -> &str {
    line.trim_matches(|c: char| c.is_whitespace() || c.is_control())
}

fn split_bulletins(content: &str) -> Vec<RawBulletin<'_>> {
    let mut bulletins: Vec<RawBulletin<'_>> = Vec::new();
    let mut offset = 0;
    for raw in content.split_inclusive(|c: char| c == '\n' || c == '\u{1}' || c == '\u{3}') {
        let line_offset = offset;
        offset += raw.len();
        let trimmed = trim_line(raw);
        if is_filler(trimmed) {
            continue;
        }
        let leading = raw.len() - raw.trim_start_matches(|c: char| c.is_whitespace() || c.is_control()).len();
        let line = Line {
            offset: line_offset + leading,
            text: trimmed,
        };
        if BulletinHeading::parse(trimmed).is_ok() {
            bulletins.push(RawBulletin {
                heading: Some(line),
                lines: Vec::new(),
            });
        } else {
            match bulletins.last_mut() {
                Some(bulletin) => bulletin.lines.push(line),
                None => bulletins.push(RawBulletin {
                    heading: None,
                    lines: vec![line],
                }),
            }
        }
    }
    bulletins
}

fn split_messages(lines: &[Line<'_>]) -> Vec<RawMessage> {
    let mut messages = Vec::new();
    let mut current: Option<RawMessage> = None;

    let push = |current: &mut Option<RawMessage>, segment: &str, offset: usize| {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return;
        }
        let leading = segment.len() - segment.trim_start().len();
        match current {
            Some(message) => {
                message.text.push(' ');
                message.text.push_str(trimmed);
            }
            None => {
                *current = Some(RawMessage {
                    offset: offset + leading,
                    text: trimmed.to_string(),
                })
            }
        }
    };

    for line in lines {
        let mut rest = line.text;
        let mut position = line.offset;
        while let Some(end) = rest.find('=') {
            push(&mut current, &rest[..end], position);
            if let Some(mut message) = current.take() {
                message.text.push('=');
                messages.push(message);
            }
            rest = &rest[end + 1..];
            position += end + 1;
        }
        push(&mut current, rest, position);
    }
    messages.extend(current);
    messages
}

fn is_location_indicator(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|c| c.is_ascii_uppercase())
}

fn is_issue_time(token: &str) -> bool {
    token.len() == 7 && token.ends_with('Z') && token.as_bytes()[..6].iter().all(u8::is_ascii_digit)
}

fn is_period(token: &str, half: usize) -> bool {
    token.len() == half * 2 + 1
        && token.as_bytes()[half] == b'/'
        && token.chars().filter(|c| *c != '/').all(|c| c.is_ascii_digit())
}

fn parse_message(text: &str) -> GenericAviationMessage {
    let mut message = GenericAviationMessage::new(MessageFormat::Tac, text);
    let body = text.trim_end_matches('=');
    let tokens: Vec<&str> = body.split_whitespace().collect();

    let type_position = tokens.iter().take(2).position(|t| TYPE_KEYWORDS.contains(t));
    let mut rest: &[&str] = &tokens;
    match type_position {
        Some(0) => {
            message.message_type = Some(MessageType::new(tokens[0]));
            rest = &tokens[1..];
            while rest.first().is_some_and(|t| MODIFIERS.contains(t)) {
                rest = &rest[1..];
            }
            if let Some(aerodrome) = rest.first().filter(|t| is_location_indicator(t)) {
                message
                    .location_indicators
                    .insert(LocationIndicatorType::Aerodrome, aerodrome.to_string());
            }
        }
        Some(_) => {
            // `EFIN SIGMET 1 VALID 020600/021000 EFKL-`
            message.message_type = Some(MessageType::new(tokens[1]));
            if is_location_indicator(tokens[0]) {
                message
                    .location_indicators
                    .insert(LocationIndicatorType::IssuingAirTrafficServicesUnit, tokens[0].to_string());
            }
            if let Some(mwo) = tokens
                .iter()
                .filter_map(|t| t.strip_suffix('-'))
                .find(|t| is_location_indicator(t))
            {
                message
                    .location_indicators
                    .insert(LocationIndicatorType::OriginatingMeteorologicalWatchOffice, mwo.to_string());
            }
        }
        None => {
            if let Some(aerodrome) = tokens.first().filter(|t| is_location_indicator(t)) {
                message
                    .location_indicators
                    .insert(LocationIndicatorType::Aerodrome, aerodrome.to_string());
            }
        }
    }

    message.issue_time = rest
        .iter()
        .find(|t| is_issue_time(t))
        .and_then(|t| PartialDateTime::parse(t).ok())
        .map(PartialOrCompleteTimeInstant::of_partial);

    let validity = match type_position {
        Some(p) if p > 0 => tokens
            .windows(2)
            .find(|w| w[0] == "VALID" && is_period(w[1], 6))
            .map(|w| w[1]),
        _ => rest.iter().find(|t| is_period(t, 4)).copied(),
    };
    message.validity_time = validity.and_then(|v| PartialOrCompleteTimePeriod::parse(v).ok());
    message
}

fn char_offset(content: &str, byte_offset: usize) -> usize {
    content.get(..byte_offset).map_or(byte_offset, |prefix| prefix.chars().count())
}

impl MessageDecoder for TacBulletinDecoder {
    fn decode(&self, content: &str, file_metadata: &Arc<FileMetadata>) -> DecodedFile {
        let mut decoded = DecodedFile::default();
        let format = file_metadata.file_config().format();
        if format != MessageFormat::Tac {
            decoded.errors.push(DecodeError {
                bulletin_index: 0,
                message_index: None,
                reason: format!("unsupported format {}", format),
            });
            return decoded;
        }

        let bulletins = split_bulletins(content);
        if bulletins.is_empty() {
            decoded.errors.push(DecodeError {
                bulletin_index: 0,
                message_index: None,
                reason: "no messages in file".to_string(),
            });
        }

        for (bulletin_index, bulletin) in bulletins.iter().enumerate() {
            let gts_heading = bulletin
                .heading
                .as_ref()
                .map(|line| InputBulletinHeading::from_raw(line.text))
                .unwrap_or_default();
            let messages = split_messages(&bulletin.lines);
            if messages.is_empty() {
                decoded.errors.push(DecodeError {
                    bulletin_index,
                    message_index: None,
                    reason: "bulletin contains no messages".to_string(),
                });
                continue;
            }
            for (message_index, raw) in messages.into_iter().enumerate() {
                decoded.messages.push(InputAviationMessage {
                    file_metadata: Arc::clone(file_metadata),
                    gts_bulletin_heading: gts_heading.clone(),
                    collect_identifier: InputBulletinHeading::default(),
                    message: parse_message(&raw.text),
                    message_reference: MessageReference::new(bulletin_index, message_index),
                    char_offset: Some(char_offset(content, raw.offset)),
                });
            }
        }
        decoded
    }
}
