//! Entity Extractor
//!
//! Scans a message for trip attributes independently of intent. Strategies:
//! 1. Gazetteer lookup of known destinations, aliases included
//! 2. Capitalised place names after travel prepositions ("to Porto, Braga and Faro")
//! 3. Dates in ISO, month-name, day-month and numeric forms
//! 4. Traveler counts
//! 5. Budgets from currency symbols, currency words and "budget of N"
//! 6. Preference keywords
//!
//! Regexes run on the original message so spans point at what the user
//! typed. Text no strategy recognises yields nothing. Extracted entities are
//! not compared against any trip context here.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use trip_types::{Budget, DateRole, Entity, EntityValue, Span};

use crate::config::{ConfigError, ExtractionVocabulary};

pub const GAZETTEER_CONFIDENCE: f32 = 0.9;
pub const PLACE_NAME_CONFIDENCE: f32 = 0.75;
pub const PREFERENCE_CONFIDENCE: f32 = 0.7;

const MONTH: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const AMOUNT: &str = r"\d[\d,]*(?:\.\d+)?";
const COUNT: &str = r"\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve";

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTH})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .unwrap()
});

static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTH})\b\.?(?:,?\s+(\d{{4}})\b)?"
    ))
    .unwrap()
});

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").unwrap());

static RETURN_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:return|returning|back|until|till|through|thru)\s+(?:on\s+)?(?:the\s+)?$")
        .unwrap()
});

/// A negation up to three words before a keyword, within one clause
static NEGATION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:no|not|nothing|none|without|avoid|avoiding|never|don't|dont|hate|skip)\s+(?:[^\s,.;!?]+\s+){0,3}$",
    )
    .unwrap()
});

static PEOPLE_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({COUNT})\s+(?:people|persons|travell?ers|adults?|guests|passengers|pax|of us)\b(?:\s+and\s+({COUNT})\s+(?:kids|children|child|infants?)\b)?"
    ))
    .unwrap()
});

static GROUP_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:family|party|group)\s+of\s+({COUNT})\b")).unwrap()
});

static SOLO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:solo|alone|by myself|on my own)\b").unwrap());

static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:couple|honeymoon|my (?:wife|husband|partner|girlfriend|boyfriend))\b")
        .unwrap()
});

static BUDGET_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bbudget\s*(?:of|is|:|=|around|about)?\s*({AMOUNT})\s*(k\b)?(?:\s*(?:-|–|to)\s*({AMOUNT})\s*(k\b)?)?"
    ))
    .unwrap()
});

static TRAVEL_PREPOSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:to|in|visit|visiting|around|explore|exploring)\s+").unwrap()
});

static NAME_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\p{Lu}[\p{L}'\-]*").unwrap());

static NAME_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]+").unwrap());

static LIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*,\s*(?:and\s+)?|\s+and\s+|\s*&\s*)").unwrap());

const MONTHS_AND_DAYS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday",
];

// ============================================================================
// Extractor
// ============================================================================

/// A byte range already consumed by a higher-priority strategy
#[derive(Debug, Default)]
struct Claims(Vec<Range<usize>>);

impl Claims {
    fn overlaps(&self, range: &Range<usize>) -> bool {
        self.0
            .iter()
            .any(|c| c.start < range.end && range.start < c.end)
    }

    fn claim(&mut self, range: Range<usize>) {
        self.0.push(range);
    }
}

/// A candidate before it is turned into an `Entity`
#[derive(Debug, Clone)]
struct Found<T> {
    value: T,
    confidence: f32,
    range: Range<usize>,
}

pub struct EntityExtractor {
    vocabulary: ExtractionVocabulary,
    reference_date: Option<NaiveDate>,
    gazetteer: Option<Regex>,
    canonical: HashMap<String, String>,
    excluded_names: HashSet<String>,
    symbol_budget: Option<Regex>,
    word_budget: Option<Regex>,
    preferences: Vec<(String, Regex)>,
}

impl EntityExtractor {
    pub fn new(vocabulary: ExtractionVocabulary) -> Result<Self, ConfigError> {
        let mut canonical = HashMap::new();
        for entry in &vocabulary.destinations {
            canonical.insert(entry.name.to_lowercase(), entry.name.clone());
            for alias in &entry.aliases {
                canonical.insert(alias.to_lowercase(), entry.name.clone());
            }
        }
        let gazetteer = alternation_regex("destinations", canonical.keys(), r"(?i)\b(?:", r")\b")?;

        let excluded_names = vocabulary
            .stopwords
            .iter()
            .map(|w| w.to_lowercase())
            .chain(MONTHS_AND_DAYS.iter().map(|w| w.to_string()))
            .collect();

        let (symbols, words): (Vec<&String>, Vec<&String>) = vocabulary
            .currencies
            .keys()
            .partition(|k| !k.chars().all(char::is_alphabetic));
        let symbol_budget = alternation_regex(
            "currency symbols",
            symbols.iter().copied(),
            "(?i)(",
            &format!(
                r")\s?({AMOUNT})\s*(k\b)?(?:\s*(?:-|–|to)\s*\D?\s?({AMOUNT})\s*(k\b)?)?"
            ),
        )?;
        let word_budget = alternation_regex(
            "currency words",
            words.iter().copied(),
            &format!(
                r"(?i)\b({AMOUNT})\s*(k\b)?(?:\s*(?:-|–|to)\s*({AMOUNT})\s*(k\b)?)?\s*("
            ),
            r")\b",
        )?;

        let mut preferences = Vec::new();
        for (label, keywords) in &vocabulary.preferences {
            if let Some(re) = alternation_regex(label, keywords.iter(), r"(?i)\b(?:", r")\b")? {
                preferences.push((label.clone(), re));
            }
        }

        Ok(Self {
            vocabulary,
            reference_date: None,
            gazetteer,
            canonical,
            excluded_names,
            symbol_budget,
            word_budget,
            preferences,
        })
    }

    /// Extractor over the embedded vocabulary
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(ExtractionVocabulary::builtin()?)
    }

    /// Fix "today" for year inference instead of using the clock
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Extract every recognised entity, ordered by span start
    pub fn extract(&self, message: &str) -> Vec<Entity> {
        let mut claims = Claims::default();
        let mut entities = Vec::new();

        // Dates first so their digits are not read as counts or amounts.
        for (role, found) in self.extract_dates(message, &mut claims) {
            entities.push(entity(
                message,
                EntityValue::Date {
                    role,
                    date: found.value,
                },
                found.confidence,
                found.range,
            ));
        }

        if let Some(found) = self.extract_budget(message, &mut claims) {
            entities.push(entity(
                message,
                EntityValue::Budget(found.value),
                found.confidence,
                found.range,
            ));
        }

        if let Some(found) = self.extract_travelers(message, &mut claims) {
            entities.push(entity(
                message,
                EntityValue::Travelers { count: found.value },
                found.confidence,
                found.range,
            ));
        }

        for found in self.extract_destinations(message, &mut claims) {
            entities.push(entity(
                message,
                EntityValue::Destination { name: found.value },
                found.confidence,
                found.range,
            ));
        }

        for found in self.extract_preferences(message) {
            entities.push(entity(
                message,
                EntityValue::Preference { label: found.value },
                found.confidence,
                found.range,
            ));
        }

        entities.sort_by_key(|e| (e.span.start, e.span.end));
        tracing::debug!(count = entities.len(), "extracted entities");
        entities
    }

    // ------------------------------------------------------------------------
    // Destinations
    // ------------------------------------------------------------------------

    fn extract_destinations(&self, message: &str, claims: &mut Claims) -> Vec<Found<String>> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        if let Some(gazetteer) = &self.gazetteer {
            for m in gazetteer.find_iter(message) {
                let range = m.range();
                if claims.overlaps(&range) {
                    continue;
                }
                let Some(name) = self.canonical.get(&m.as_str().to_lowercase()) else {
                    continue;
                };
                claims.claim(range.clone());
                if seen.insert(name.to_lowercase()) {
                    found.push(Found {
                        value: name.clone(),
                        confidence: GAZETTEER_CONFIDENCE,
                        range,
                    });
                }
            }
        }

        for prep in TRAVEL_PREPOSITION.find_iter(message) {
            for range in self.scan_place_list(message, prep.end()) {
                if claims.overlaps(&range) {
                    continue;
                }
                let name = message[range.clone()].to_string();
                claims.claim(range.clone());
                if seen.insert(name.to_lowercase()) {
                    found.push(Found {
                        value: name,
                        confidence: PLACE_NAME_CONFIDENCE,
                        range,
                    });
                }
            }
        }

        found
    }

    /// Capitalised names starting at `pos`, joined by commas, "and" or "&"
    fn scan_place_list(&self, message: &str, mut pos: usize) -> Vec<Range<usize>> {
        let mut names = Vec::new();
        loop {
            let Some(name) = self.scan_place_name(message, pos) else {
                break;
            };
            pos = name.end;
            names.push(name);

            match LIST_SEPARATOR.find(&message[pos..]) {
                Some(sep) => pos += sep.end(),
                None => break,
            }
        }
        names
    }

    /// One or more capitalised words, stopping at excluded words
    fn scan_place_name(&self, message: &str, start: usize) -> Option<Range<usize>> {
        let mut end = None;
        let mut cursor = start;
        loop {
            let word = NAME_WORD.find(&message[cursor..])?;
            let word_range = cursor..cursor + word.end();
            if self
                .excluded_names
                .contains(&message[word_range.clone()].to_lowercase())
            {
                break;
            }
            end = Some(word_range.end);
            cursor = word_range.end;

            let Some(gap) = NAME_GAP.find(&message[cursor..]) else {
                break;
            };
            if NAME_WORD.find(&message[cursor + gap.end()..]).is_none() {
                break;
            }
            cursor += gap.end();
        }
        end.map(|end| start..end)
    }

    // ------------------------------------------------------------------------
    // Dates
    // ------------------------------------------------------------------------

    fn extract_dates(
        &self,
        message: &str,
        claims: &mut Claims,
    ) -> Vec<(DateRole, Found<NaiveDate>)> {
        let today = self.today();
        let mut candidates: Vec<Found<NaiveDate>> = Vec::new();

        for caps in ISO_DATE.captures_iter(message) {
            let date = resolve_date(
                today,
                caps[2].parse().ok(),
                caps[3].parse().ok(),
                caps[1].parse().ok(),
            );
            push_date(&mut candidates, found_date(&caps, date, 0.95));
        }
        for caps in MONTH_DAY.captures_iter(message) {
            let date = resolve_date(
                today,
                month_number(&caps[1]),
                caps[2].parse().ok(),
                caps.get(3).and_then(|y| y.as_str().parse().ok()),
            );
            push_date(&mut candidates, found_date(&caps, date, 0.9));
        }
        for caps in DAY_MONTH.captures_iter(message) {
            let date = resolve_date(
                today,
                month_number(&caps[2]),
                caps[1].parse().ok(),
                caps.get(3).and_then(|y| y.as_str().parse().ok()),
            );
            push_date(&mut candidates, found_date(&caps, date, 0.9));
        }
        for caps in NUMERIC_DATE.captures_iter(message) {
            let year = caps[3].parse::<i32>().ok().map(|y| if y < 100 { 2000 + y } else { y });
            let date = resolve_date(today, caps[1].parse().ok(), caps[2].parse().ok(), year);
            push_date(&mut candidates, found_date(&caps, date, 0.8));
        }

        candidates.sort_by_key(|c| c.range.start);

        let mut dated = Vec::new();
        let (mut departure, mut ret) = (false, false);
        for found in candidates {
            let cued = RETURN_CUE.is_match(&message[..found.range.start]);
            let role = if cued || departure {
                DateRole::Return
            } else {
                DateRole::Departure
            };
            let taken = match role {
                DateRole::Departure => &mut departure,
                DateRole::Return => &mut ret,
            };
            if *taken {
                continue;
            }
            *taken = true;
            claims.claim(found.range.clone());
            dated.push((role, found));
        }
        dated
    }

    // ------------------------------------------------------------------------
    // Travelers
    // ------------------------------------------------------------------------

    fn extract_travelers(&self, message: &str, claims: &mut Claims) -> Option<Found<u32>> {
        let mut best: Option<Found<u32>> = None;
        let mut consider = |found: Found<u32>| {
            if claims.overlaps(&found.range) {
                return;
            }
            if best.as_ref().map_or(true, |b| found.confidence > b.confidence) {
                best = Some(found);
            }
        };

        for caps in PEOPLE_COUNT.captures_iter(message) {
            let adults = parse_count(&caps[1]);
            let children = caps.get(2).map(|c| parse_count(c.as_str()));
            let count = match children {
                Some(children) => adults.zip(children).map(|(a, c)| a + c),
                None => adults,
            };
            if let (Some(count), Some(m)) = (count, caps.get(0)) {
                consider(Found {
                    value: count,
                    confidence: 0.9,
                    range: m.range(),
                });
            }
        }
        for caps in GROUP_OF.captures_iter(message) {
            if let (Some(count), Some(m)) = (parse_count(&caps[1]), caps.get(0)) {
                consider(Found {
                    value: count,
                    confidence: 0.85,
                    range: m.range(),
                });
            }
        }
        for m in SOLO.find_iter(message) {
            consider(Found {
                value: 1,
                confidence: 0.8,
                range: m.range(),
            });
        }
        for m in PAIR.find_iter(message) {
            // "a couple of days" is a quantity, not a pair of travelers
            if message[m.end()..].trim_start().to_lowercase().starts_with("of ") {
                continue;
            }
            consider(Found {
                value: 2,
                confidence: 0.8,
                range: m.range(),
            });
        }

        if let Some(found) = &best {
            claims.claim(found.range.clone());
        }
        best
    }

    // ------------------------------------------------------------------------
    // Budget
    // ------------------------------------------------------------------------

    fn extract_budget(&self, message: &str, claims: &mut Claims) -> Option<Found<Budget>> {
        let default_currency = self.vocabulary.default_currency.as_str();
        let mut best: Option<Found<Budget>> = None;
        let mut consider = |found: Option<Found<Budget>>| {
            let Some(found) = found else {
                return;
            };
            if claims.overlaps(&found.range) {
                return;
            }
            if best.as_ref().map_or(true, |b| found.confidence > b.confidence) {
                best = Some(found);
            }
        };

        if let Some(re) = &self.symbol_budget {
            for caps in re.captures_iter(message) {
                let currency = self.vocabulary.currency_for(&caps[1]).unwrap_or(default_currency);
                consider(budget_from(&caps, 2, currency, 0.9));
            }
        }
        if let Some(re) = &self.word_budget {
            for caps in re.captures_iter(message) {
                let currency = self.vocabulary.currency_for(&caps[5]).unwrap_or(default_currency);
                consider(budget_from(&caps, 1, currency, 0.85));
            }
        }
        for caps in BUDGET_KEYWORD.captures_iter(message) {
            consider(budget_from(&caps, 1, default_currency, 0.8));
        }

        if let Some(found) = &best {
            claims.claim(found.range.clone());
        }
        best
    }

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    fn extract_preferences(&self, message: &str) -> Vec<Found<String>> {
        self.preferences
            .iter()
            .filter_map(|(label, re)| {
                re.find_iter(message)
                    .find(|m| !NEGATION_CUE.is_match(&message[..m.start()]))
                    .map(|m| Found {
                        value: label.clone(),
                        confidence: PREFERENCE_CONFIDENCE,
                        range: m.range(),
                    })
            })
            .collect()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn entity(message: &str, value: EntityValue, confidence: f32, range: Range<usize>) -> Entity {
    Entity::new(
        value,
        confidence,
        Span::from_byte_range(message, range.start, range.end),
    )
}

/// `prefix (a|b|...) suffix` over escaped terms, longest first. `None` when
/// there are no terms.
fn alternation_regex<'a>(
    entry: &str,
    terms: impl Iterator<Item = &'a String>,
    prefix: &str,
    suffix: &str,
) -> Result<Option<Regex>, ConfigError> {
    let mut terms: Vec<String> = terms
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return Ok(None);
    }
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup();

    let escaped: Vec<String> = terms.iter().map(|t| regex::escape(t)).collect();
    let pattern = format!("{}{}{}", prefix, escaped.join("|"), suffix);
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| ConfigError::InvalidVocabulary {
            entry: entry.to_string(),
            source,
        })
}

/// Keep the first of overlapping date readings
fn push_date(candidates: &mut Vec<Found<NaiveDate>>, found: Option<Found<NaiveDate>>) {
    let Some(found) = found else {
        return;
    };
    if !candidates
        .iter()
        .any(|c| c.range.start < found.range.end && found.range.start < c.range.end)
    {
        candidates.push(found);
    }
}

fn found_date(caps: &Captures<'_>, date: Option<NaiveDate>, confidence: f32) -> Option<Found<NaiveDate>> {
    Some(Found {
        value: date?,
        confidence,
        range: caps.get(0)?.range(),
    })
}

/// Build a date, inferring a missing year as the next occurrence on or after
/// `today`. Impossible dates yield `None`.
fn resolve_date(
    today: NaiveDate,
    month: Option<u32>,
    day: Option<u32>,
    year: Option<i32>,
) -> Option<NaiveDate> {
    let (month, day) = (month?, day?);
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(date) if date >= today => Some(date),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
            }
        }
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_count(token: &str) -> Option<u32> {
    let lower = token.to_lowercase();
    let count = match lower.as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => return digits.parse().ok(),
    };
    Some(count)
}

fn parse_amount(amount: &str, thousands: bool) -> Option<Decimal> {
    let value = Decimal::from_str(&amount.replace(',', "")).ok()?;
    if thousands {
        value.checked_mul(Decimal::from(1000))
    } else {
        Some(value)
    }
}

/// Read `amount k? (- amount k?)?` starting at capture group `first`
fn budget_from(
    caps: &Captures<'_>,
    first: usize,
    currency: &str,
    confidence: f32,
) -> Option<Found<Budget>> {
    let low_k = caps.get(first + 1).is_some();
    let high = caps.get(first + 2);
    let high_k = caps.get(first + 3).is_some();

    let value = match high {
        // "2-3k" reads as 2000-3000
        Some(high) => Budget::range(
            parse_amount(caps.get(first)?.as_str(), low_k || high_k)?,
            parse_amount(high.as_str(), high_k)?,
            currency,
        ),
        None => Budget::up_to(parse_amount(caps.get(first)?.as_str(), low_k)?, currency),
    };

    Some(Found {
        value,
        confidence,
        range: caps.get(0)?.range(),
    })
}
