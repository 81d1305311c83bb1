//! URL state codec.
//!
//! Decoding is forgiving: every field accepts legacy names, the query string
//! wins over the hash fragment, and the hash wins over the trailing path
//! segment. Anything malformed is simply absent. Encoding always writes the
//! canonical names in a fixed order with fixed precision, so a shared link
//! re-encodes to itself.

use crate::conversion::{compute_p, compute_q, compute_rate};
use crate::{ConfigRegistry, Error, Language, Mode, Ratio, Result, Session};
use url::{form_urlencoded, Url};

/// Decimal places for weight
pub const WEIGHT_PRECISION: usize = 1;
/// Decimal places for dose-rate and infusion rate
pub const RATE_PRECISION: usize = 2;

/// Origin used to resolve bare query strings like `?drug=dopa`
pub const FALLBACK_BASE: &str = "https://localhost/";

/// One canonical URL parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Drug,
    Mode,
    Lang,
    Conc,
    Dose,
    Weight,
    Rate,
}

/// Accepted parameter names, canonical name first
///
/// Within a source, earlier names take priority over later ones.
pub const PARAM_NAMES: &[(Field, &[&str])] = &[
    (Field::Drug, &["drug", "med", "medicine"]),
    (Field::Mode, &["mode", "m", "reverse", "rev"]),
    (Field::Lang, &["lang", "language", "locale"]),
    (Field::Conc, &["conc", "concentration", "a"]),
    (Field::Dose, &["p", "dose"]),
    (Field::Weight, &["b", "wt", "weight"]),
    (Field::Rate, &["rate", "mlhr", "mlh", "r"]),
];

/// `mode` values meaning reverse
const REVERSE_TOKENS: &[&str] = &["reverse", "rev", "r", "1", "true", "yes", "on"];

/// `lang` values meaning Thai
const THAI_TOKENS: &[&str] = &["th", "thai", "th-th"];

impl Field {
    pub fn names(self) -> &'static [&'static str] {
        PARAM_NAMES
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, names)| *names)
            .unwrap_or(&[])
    }

    pub fn canonical(self) -> &'static str {
        self.names().first().copied().unwrap_or("")
    }
}

/// Parameters read from a location, before registry resolution
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UrlParams {
    /// Trimmed, lowercased slug; may be a synonym
    pub drug: Option<String>,
    pub mode: Mode,
    /// `None` when no language parameter was present
    pub language: Option<Language>,
    /// Whitespace-stripped, not yet checked against the drug
    pub concentration: Option<String>,
    pub dose_rate: Option<f64>,
    pub weight_kg: Option<f64>,
    pub infusion_rate: Option<f64>,
}

/// Parse an absolute URL, or a relative one such as `?drug=dopa` or `#/ntg`
pub fn parse_location(input: &str) -> Option<Url> {
    let input = input.trim();
    Url::parse(input)
        .ok()
        .or_else(|| Url::parse(FALLBACK_BASE).ok()?.join(input).ok())
}

/// Permissive number parsing; anything non-finite is absent
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn parse_mode(raw: Option<&str>) -> Mode {
    match raw {
        Some(s) if REVERSE_TOKENS.contains(&s.trim().to_lowercase().as_str()) => Mode::Reverse,
        _ => Mode::Forward,
    }
}

pub fn parse_language(raw: &str) -> Language {
    if THAI_TOKENS.contains(&raw.trim().to_lowercase().as_str()) {
        Language::Th
    } else {
        Language::En
    }
}

/// Round through the emitted text so decode(encode(x)) is exact
pub fn quantize(value: f64, places: usize) -> f64 {
    format!("{:.*}", places, value).parse().unwrap_or(value)
}

struct Pairs(Vec<(String, String)>);

impl Pairs {
    fn parse(qs: &str) -> Self {
        Self(form_urlencoded::parse(qs.as_bytes()).into_owned().collect())
    }

    /// First non-empty value under any of the field's names, in name order
    fn get(&self, field: Field) -> Option<&str> {
        field.names().iter().find_map(|name| {
            self.0
                .iter()
                .find(|(key, value)| key == name && !value.trim().is_empty())
                .map(|(_, value)| value.as_str())
        })
    }
}

/// Split a fragment into `(path, query)`
///
/// `/<slug>?qs` and `/<slug>`, `?qs`, `k=v&...`, and a bare `slug` are accepted.
fn split_fragment(fragment: &str) -> (&str, &str) {
    if let Some(rest) = fragment.strip_prefix('/') {
        match rest.split_once('?') {
            Some((path, qs)) => (path, qs),
            None => (rest, ""),
        }
    } else if let Some(qs) = fragment.strip_prefix('?') {
        ("", qs)
    } else if fragment.contains('=') {
        ("", fragment)
    } else {
        (fragment, "")
    }
}

fn normalize_slug(raw: &str) -> Option<String> {
    let slug = raw.trim().trim_matches('/').to_lowercase();
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Read every field from a location
pub fn decode(url: &Url) -> UrlParams {
    let query = Pairs::parse(url.query().unwrap_or(""));
    let (hash_path, hash_qs) = split_fragment(url.fragment().unwrap_or(""));
    let hash = Pairs::parse(hash_qs);

    let pick = |field: Field| query.get(field).or_else(|| hash.get(field));

    let drug = query
        .get(Field::Drug)
        .and_then(normalize_slug)
        .or_else(|| normalize_slug(hash_path))
        .or_else(|| hash.get(Field::Drug).and_then(normalize_slug))
        .or_else(|| {
            url.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .and_then(normalize_slug)
        });

    UrlParams {
        drug,
        mode: parse_mode(pick(Field::Mode)),
        language: pick(Field::Lang).map(parse_language),
        concentration: pick(Field::Conc)
            .map(|c| c.chars().filter(|ch| !ch.is_whitespace()).collect()),
        dose_rate: pick(Field::Dose).and_then(parse_number),
        weight_kg: pick(Field::Weight).and_then(parse_number),
        infusion_rate: pick(Field::Rate).and_then(parse_number),
    }
}

/// Build a session from a location
///
/// Unknown drugs fall back to the first drug and unoffered concentrations to
/// the drug default. Missing numbers stay unset, including a forward dose
/// without `p`, so `encode(hydrate(encode(s))) == encode(s)` holds for every
/// session. `current_language` applies when the location carries no language.
pub fn hydrate(url: &Url, registry: &ConfigRegistry, current_language: Language) -> Result<Session> {
    let params = decode(url);
    tracing::debug!("Decoded location {}: {:?}", url, params);

    let drug = registry
        .resolve_or_first(params.drug.as_deref())
        .ok_or_else(|| Error::State("registry has no drugs".into()))?;
    if let Some(slug) = params.drug.as_deref() {
        if registry.resolve(slug).is_none() {
            tracing::debug!("Unknown drug '{}', using '{}'", slug, drug.id);
        }
    }
    let mut session = Session::for_drug(drug, params.language.unwrap_or(current_language));

    if let Some(conc) = params.concentration.as_deref() {
        session.on_concentration_change(registry, conc);
    }

    session.set_mode(params.mode);
    session.set_weight(params.weight_kg.map(|b| quantize(b, WEIGHT_PRECISION)));
    match params.mode {
        Mode::Forward => {
            session.set_dose_rate(params.dose_rate.map(|p| quantize(p, RATE_PRECISION)));
        }
        Mode::Reverse => {
            session.set_infusion_rate(params.infusion_rate.map(|r| quantize(r, RATE_PRECISION)));
        }
    }

    Ok(session)
}

fn derived(concentration: &Ratio, weight_kg: Option<f64>, compute: impl Fn(f64) -> f64) -> Option<f64> {
    weight_kg
        .filter(|b| *b > 0.0)
        .map(|b| compute(compute_q(b, concentration.mg_per_ml())))
        .filter(|v| v.is_finite())
}

/// Canonical query string for a session
///
/// Order is `drug, mode, lang, conc`, then `p, b, rate` in forward mode or
/// `rate, b, p` in reverse mode; the second rate/dose value is computed from
/// the quantized inputs. Absent values are omitted.
pub fn encode(session: &Session) -> String {
    let weight = session
        .weight_kg
        .filter(|b| b.is_finite())
        .map(|b| quantize(b, WEIGHT_PRECISION));
    let fmt_rate = |v: f64| format!("{:.*}", RATE_PRECISION, v);
    let fmt_weight = |v: f64| format!("{:.*}", WEIGHT_PRECISION, v);

    let mut params = form_urlencoded::Serializer::new(String::new());
    params
        .append_pair(Field::Drug.canonical(), &session.selected_drug_id)
        .append_pair(Field::Mode.canonical(), session.mode.as_str())
        .append_pair(Field::Lang.canonical(), session.language.as_str())
        .append_pair(Field::Conc.canonical(), session.selected_concentration.as_str());

    let conc = &session.selected_concentration;
    match session.mode {
        Mode::Forward => {
            let p = session
                .dose_rate
                .filter(|p| p.is_finite())
                .map(|p| quantize(p, RATE_PRECISION));
            let rate = p.and_then(|p| derived(conc, weight, |q| compute_rate(p, q)));
            if let Some(p) = p {
                params.append_pair(Field::Dose.canonical(), &fmt_rate(p));
            }
            if let Some(b) = weight {
                params.append_pair(Field::Weight.canonical(), &fmt_weight(b));
            }
            if let Some(rate) = rate {
                params.append_pair(Field::Rate.canonical(), &fmt_rate(rate));
            }
        }
        Mode::Reverse => {
            let rate = session
                .infusion_rate
                .filter(|r| r.is_finite())
                .map(|r| quantize(r, RATE_PRECISION));
            let p = rate.and_then(|rate| derived(conc, weight, |q| compute_p(rate, q)));
            if let Some(rate) = rate {
                params.append_pair(Field::Rate.canonical(), &fmt_rate(rate));
            }
            if let Some(b) = weight {
                params.append_pair(Field::Weight.canonical(), &fmt_weight(b));
            }
            if let Some(p) = p {
                params.append_pair(Field::Dose.canonical(), &fmt_rate(p));
            }
        }
    }

    let encoded = params.finish();
    tracing::debug!("Encoded session: {}", encoded);
    encoded
}

/// Shareable link: `base` with the canonical query and no fragment
pub fn share_url(base: &Url, session: &Session) -> Url {
    let mut url = base.clone();
    url.set_query(Some(&encode(session)));
    url.set_fragment(None);
    url
}
