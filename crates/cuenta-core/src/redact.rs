//! Reversible PII redaction with an integrity tag
//!
//! [`PiiRedactor::redact`] replaces PII spans with `⟪PII:<TYPE>:<n>⟫` tokens,
//! returning the redacted text, a token → original map and an HMAC-SHA256 of
//! the redacted payload. [`restore`] and [`restore_value`] put the originals
//! back, the latter through an arbitrary JSON document.
//!
//! Patterns run in a fixed priority order, each only over text that is not
//! already a token, so a labelled match ("CLABE: 002 ...") is consumed before
//! a bare digit-run pattern could split it differently. The regex engine has
//! no look-around, so the boundary conditions a pattern needs (no digit right
//! before or after, no trailing `,`/`.`) are checked on each candidate match.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::RedactionMap;

type HmacSha256 = Hmac<Sha256>;

/// Any token this module can produce
static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"⟪PII:([A-Z_]+):(\d+)⟫").expect("valid regex"));

/// Vocabulary the preserving mode never tokenizes: transaction keywords,
/// letter+two-digit transaction codes and money amounts
static PROTECTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:\b(?:SPEI|N[OÓ]MINA|PAGO|TRANSFERENCIA|DEP[OÓ]SITO|RETIRO|INTERESES|TRASPASO)\b)|\b[A-Z]\d{2}\b|\d[\d,]*\.\d{2}\b",
    )
    .expect("valid regex")
});

/// Boundary checks applied to a candidate match
#[derive(Debug, Clone, Copy, Default)]
struct Guard {
    no_digit_before: bool,
    no_digit_after: bool,
    /// No uppercase ASCII letter right after
    no_upper_after: bool,
    /// No `,` or `.` right after
    no_punct_after: bool,
    /// Match must contain at least one digit
    needs_digit: bool,
}

impl Guard {
    fn accepts(&self, hay: &str, start: usize, end: usize) -> bool {
        let before = hay[..start].chars().next_back();
        let after = hay[end..].chars().next();

        if self.no_digit_before && before.is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        if self.no_digit_after && after.is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        if self.no_upper_after && after.is_some_and(|c| c.is_ascii_uppercase()) {
            return false;
        }
        if self.no_punct_after && after.is_some_and(|c| c == ',' || c == '.') {
            return false;
        }
        if self.needs_digit && !hay[start..end].chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        true
    }
}

struct PiiPattern {
    /// Token type; labelled and bare variants share one sequence
    kind: &'static str,
    regex: Regex,
    guard: Guard,
}

fn pattern(kind: &'static str, regex: &str, guard: Guard) -> PiiPattern {
    PiiPattern {
        kind,
        regex: Regex::new(regex).expect("valid regex"),
        guard,
    }
}

const DIGIT_AFTER: Guard = Guard {
    no_digit_before: false,
    no_digit_after: true,
    no_upper_after: false,
    no_punct_after: false,
    needs_digit: false,
};

const DIGIT_RUN: Guard = Guard {
    no_digit_before: true,
    no_digit_after: true,
    no_upper_after: false,
    no_punct_after: false,
    needs_digit: false,
};

const ADDRESS_KEYWORDS: &str =
    r"(?:(?:calle|avenida|av|blvd|boulevard|colonia|col|cp|mz|manzana|lt|lote|plaza)\b\.?|c\.p\.)";

/// Patterns in priority order
static PATTERNS: Lazy<Vec<PiiPattern>> = Lazy::new(|| {
    vec![
        pattern(
            "EMAIL",
            r"(?i)\b[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}\b",
            Guard::default(),
        ),
        pattern(
            "PHONE",
            r"(?i)\b(?:tel[eé]fono|telef[oó]nica|tel|celular|cel|m[oó]vil|whatsapp|wa)\b[ \t]*:?[ \t]*(?:\+?52)?[ \-()]*\d(?:[ \-()]*\d){7,}",
            DIGIT_AFTER,
        ),
        pattern(
            "ACCOUNT",
            r"(?i)\b(?:no\.?[ \t]*de[ \t]*(?:cuenta|cliente)|cuenta|cliente)[ \t]*:?[ \t]*\d(?:[ \-]*\d){5,11}",
            DIGIT_AFTER,
        ),
        pattern(
            "CLABE",
            r"(?i)\b(?:cuenta[ \t]*clabe|clabe)[ \t]*:?[ \t]*\d(?:[ \-]?\d){17}",
            DIGIT_AFTER,
        ),
        pattern(
            "CARD",
            r"(?i)\b(?:n[uú]mero[ \t]*de[ \t]*tarjeta|num\.?[ \t]*tarjeta|tarjeta|card)[ \t]*:?[ \t]*\d(?:[ \-]?\d){15}",
            DIGIT_AFTER,
        ),
        pattern("CLABE", r"\d(?:[ \-]?\d){17}", DIGIT_RUN),
        pattern("CARD", r"\d(?:[ \-]?\d){15}", DIGIT_RUN),
        pattern(
            "HUGE_NUMBER",
            r"\b\d{20,}\b",
            Guard {
                no_punct_after: true,
                ..Guard::default()
            },
        ),
        pattern(
            "RFC",
            r"(?i)\brfc[ \t]*:?[ \t]*[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{2,3}\b",
            Guard::default(),
        ),
        pattern(
            "RFC",
            r"(?i)\b[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{2,3}\b",
            Guard::default(),
        ),
        pattern(
            "CURP",
            r"(?i)\bcurp[ \t]*:?[ \t]*[A-Z][AEIOUX][A-Z]{2}\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])[HM][A-Z]{5}[A-Z0-9]\d\b",
            Guard::default(),
        ),
        pattern(
            "CURP",
            r"(?i)\b[A-Z][AEIOUX][A-Z]{2}\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])[HM][A-Z]{5}[A-Z0-9]\d\b",
            Guard::default(),
        ),
        pattern(
            "IBAN",
            r"(?i)\b(?:iban|cuenta[ \t]*internacional)[ \t]*:?[ \t]*[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b",
            Guard::default(),
        ),
        pattern(
            "IBAN",
            r"(?i)\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b",
            Guard::default(),
        ),
        pattern(
            "ADDRESS",
            &format!(
                r"(?i)\b(?:direcci[oó]n|domiciliad[oa]|domicilio|dir|dom)[ \t]*:?[ \t]*{}[^,\n]{{0,60}}",
                ADDRESS_KEYWORDS
            ),
            Guard::default(),
        ),
        pattern(
            "ADDRESS",
            &format!(r"(?i)\b{}[^,\n]{{0,60}}", ADDRESS_KEYWORDS),
            Guard::default(),
        ),
        pattern(
            "PHONE",
            r"(?:\+?52[ \-()]*)?\(?\d(?:[ \-()]*\d){9}",
            Guard {
                no_digit_before: true,
                no_digit_after: true,
                no_upper_after: true,
                ..Guard::default()
            },
        ),
        pattern(
            "PREFIXED_ID",
            r"(?i)\b(?:REFERENCIA|NUMERO|GUIA|REF|CIE|ID):[A-Z0-9]{10,}\b",
            Guard::default(),
        ),
        pattern(
            "LONG_ALPHANUMERIC",
            r"(?i)\b[A-Z0-9]{12,}\b",
            Guard {
                no_punct_after: true,
                needs_digit: true,
                ..Guard::default()
            },
        ),
    ]
});

/// Output of one redaction pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub text: String,
    pub map: RedactionMap,
    pub hmac: String,
}

/// Pattern-based PII tokenizer keyed by a server-side HMAC secret
#[derive(Clone)]
pub struct PiiRedactor {
    secret: Vec<u8>,
    extra_protected: Option<Regex>,
}

impl std::fmt::Debug for PiiRedactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiiRedactor")
            .field("secret", &"<redacted>")
            .field("extra_protected", &self.extra_protected)
            .finish()
    }
}

impl PiiRedactor {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Redaction("redaction secret is empty".into()));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            extra_protected: None,
        })
    }

    /// Also preserve these bank-specific terms (transaction codes, keywords)
    pub fn with_protected_terms(mut self, terms: &[String]) -> Self {
        let alternatives: Vec<String> = terms
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| regex::escape(t.trim()))
            .collect();
        if !alternatives.is_empty() {
            self.extra_protected =
                Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok();
        }
        self
    }

    /// Tokenize every PII span
    pub fn redact(&self, text: &str) -> Result<Redaction> {
        self.run(text, false)
    }

    /// Tokenize PII but never transaction vocabulary or amounts
    ///
    /// A candidate span that runs into a protected word is clipped just
    /// before it; one that starts on a protected word is left alone.
    pub fn redact_preserving_transactions(&self, text: &str) -> Result<Redaction> {
        self.run(text, true)
    }

    /// Hex HMAC-SHA256 of the exact payload
    pub fn hmac_for(&self, payload: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a hex tag against the payload
    pub fn valid_hmac(&self, payload: &str, tag: &str) -> bool {
        let Ok(expected) = hex::decode(tag.trim()) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(payload.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Redaction(format!("invalid HMAC key: {}", e)))
    }

    fn run(&self, text: &str, preserving: bool) -> Result<Redaction> {
        let mut state = TokenState::seeded_from(text);
        let mut redacted = text.to_string();

        for pattern in PATTERNS.iter() {
            redacted = self.apply(&redacted, pattern, preserving, &mut state);
        }

        let hmac = self.hmac_for(&redacted)?;
        debug!(tokens = state.map.len(), preserving, "Redacted text");

        Ok(Redaction {
            text: redacted,
            map: state.map,
            hmac,
        })
    }

    /// Run one pattern over every non-token segment of `text`
    fn apply(
        &self,
        text: &str,
        pattern: &PiiPattern,
        preserving: bool,
        state: &mut TokenState,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for token in TOKEN.find_iter(text) {
            self.replace_segment(&text[last..token.start()], pattern, preserving, state, &mut out);
            out.push_str(token.as_str());
            last = token.end();
        }
        self.replace_segment(&text[last..], pattern, preserving, state, &mut out);
        out
    }

    fn replace_segment(
        &self,
        segment: &str,
        pattern: &PiiPattern,
        preserving: bool,
        state: &mut TokenState,
        out: &mut String,
    ) {
        let mut copied = 0;
        let mut pos = 0;

        while pos <= segment.len() {
            let Some(m) = pattern.regex.find_at(segment, pos) else {
                break;
            };
            let (start, mut end) = (m.start(), m.end());

            let mut accepted = pattern.guard.accepts(segment, start, end);
            if accepted && preserving && pattern.kind != "EMAIL" {
                match self.protected_boundary(segment, start, end) {
                    Some(clip) if clip <= start => accepted = false,
                    Some(clip) => {
                        end = start + segment[start..clip].trim_end().len();
                        accepted = end > start;
                    }
                    None => {}
                }
            }

            if !accepted || end == start {
                pos = next_char_boundary(segment, start);
                continue;
            }

            out.push_str(&segment[copied..start]);
            out.push_str(&state.token_for(pattern.kind, &segment[start..end]));
            copied = end;
            pos = end;
        }

        out.push_str(&segment[copied..]);
    }

    /// Start of the first standalone protected term overlapping `[start, end)`
    fn protected_boundary(&self, hay: &str, start: usize, end: usize) -> Option<usize> {
        let overlapping = |re: &Regex| {
            re.find_iter(hay)
                .find(|m| m.end() > start && m.start() < end && standalone(hay, m.start(), m.end()))
                .map(|m| m.start())
        };

        let builtin = overlapping(&*PROTECTED);
        let extra = self.extra_protected.as_ref().and_then(overlapping);
        match (builtin, extra) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Per-type sequence counters and the token map being built
struct TokenState {
    seq: HashMap<&'static str, u64>,
    /// Highest sequence already present in the input, per type name
    seen: HashMap<String, u64>,
    map: RedactionMap,
}

impl TokenState {
    /// Start numbering above any token-shaped text already in the input
    fn seeded_from(text: &str) -> Self {
        let mut seen: HashMap<String, u64> = HashMap::new();
        for caps in TOKEN.captures_iter(text) {
            let n = caps[2].parse::<u64>().unwrap_or(0);
            let entry = seen.entry(caps[1].to_string()).or_default();
            *entry = (*entry).max(n);
        }
        Self {
            seq: HashMap::new(),
            seen,
            map: RedactionMap::new(),
        }
    }

    fn token_for(&mut self, kind: &'static str, original: &str) -> String {
        let floor = self.seen.get(kind).copied().unwrap_or(0);
        let counter = self.seq.entry(kind).or_insert(floor);
        *counter += 1;
        let token = format!("⟪PII:{}:{}⟫", kind, counter);
        self.map
            .entry(token.clone())
            .or_insert_with(|| original.to_string());
        token
    }
}

/// A protected term embedded in a larger identifier (`nomina@empresa.com`,
/// `juan@pago.mx`) does not count
fn standalone(hay: &str, start: usize, end: usize) -> bool {
    let joins = |c: char, beyond: Option<char>| {
        c.is_alphanumeric()
            || matches!(c, '@' | '_')
            || (c == '.' && beyond.is_some_and(char::is_alphanumeric))
    };

    let mut before = hay[..start].chars().rev();
    let joined_before = before.next().is_some_and(|c| joins(c, before.next()));
    let mut after = hay[end..].chars();
    let joined_after = after.next().is_some_and(|c| joins(c, after.next()));
    !joined_before && !joined_after
}

fn next_char_boundary(s: &str, at: usize) -> usize {
    at + s[at..].chars().next().map_or(1, char::len_utf8)
}

/// Replace every mapped token in `text` with its original value
pub fn restore(text: &str, map: &RedactionMap) -> String {
    if map.is_empty() {
        return text.to_string();
    }
    map.iter()
        .fold(text.to_string(), |acc, (token, original)| {
            acc.replace(token.as_str(), original)
        })
}

/// Restore tokens in every string inside a JSON document
pub fn restore_value(value: Value, map: &RedactionMap) -> Value {
    match value {
        Value::String(s) => Value::String(restore(&s, map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| restore_value(item, map))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, item)| (key, restore_value(item, map)))
                .collect(),
        ),
        other => other,
    }
}

/// Whether `text` still contains any redaction token
pub fn contains_tokens(text: &str) -> bool {
    TOKEN.is_match(text)
}
