//! Content negotiation: media types, `Accept` parsing and best-match selection,
//! `Accept-Language` parsing, and the table of recognized URL extensions.

use std::cmp::Ordering;

/// A media type with an optional quality factor.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
	pub type_: String,
	pub subtype: String,
	pub quality: f32,
}

impl MediaType {
	/// Creates a media type with quality 1.0.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::MediaType;
	///
	/// let html = MediaType::new("text", "html");
	/// assert_eq!(html.to_string(), "text/html");
	/// assert_eq!(html.quality, 1.0);
	/// ```
	pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
		Self {
			type_: type_.into(),
			subtype: subtype.into(),
			quality: 1.0,
		}
	}

	/// Parses `type/subtype; q=0.5`. Parameters other than `q` are ignored.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::MediaType;
	///
	/// let mt = MediaType::parse("application/json; q=0.8").unwrap();
	/// assert_eq!(mt.subtype, "json");
	/// assert_eq!(mt.quality, 0.8);
	/// assert!(MediaType::parse("garbage").is_none());
	/// ```
	pub fn parse(s: &str) -> Option<Self> {
		let mut parts = s.split(';');
		let essence = parts.next()?.trim();
		let (type_, subtype) = essence.split_once('/')?;
		let (type_, subtype) = (type_.trim(), subtype.trim());
		if type_.is_empty() || subtype.is_empty() {
			return None;
		}

		let mut quality = 1.0;
		for param in parts {
			if let Some((name, value)) = param.split_once('=')
				&& name.trim().eq_ignore_ascii_case("q")
			{
				quality = value.trim().parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
			}
		}

		Some(Self {
			type_: type_.to_ascii_lowercase(),
			subtype: subtype.to_ascii_lowercase(),
			quality,
		})
	}

	/// Whether this (possibly wildcard) range matches a concrete type.
	pub fn matches(&self, other: &MediaType) -> bool {
		(self.type_ == "*" || self.type_ == other.type_)
			&& (self.subtype == "*" || self.subtype == other.subtype)
	}

	/// 0 for `*/*`, 1 for `type/*`, 2 for a concrete type.
	fn specificity(&self) -> u8 {
		match (self.type_.as_str(), self.subtype.as_str()) {
			("*", _) => 0,
			(_, "*") => 1,
			_ => 2,
		}
	}
}

impl std::fmt::Display for MediaType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.type_, self.subtype)
	}
}

/// A parsed `Accept` header.
#[derive(Debug, Clone)]
pub struct AcceptHeader {
	pub media_types: Vec<MediaType>,
}

impl AcceptHeader {
	/// Parses an `Accept` header, sorting ranges by decreasing quality.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::AcceptHeader;
	///
	/// let accept = AcceptHeader::parse("text/html, application/json; q=0.8, */*; q=0.1");
	/// assert_eq!(accept.media_types.len(), 3);
	/// assert_eq!(accept.media_types[0].subtype, "html");
	/// ```
	pub fn parse(header: &str) -> Self {
		let mut media_types: Vec<MediaType> = header
			.split(',')
			.filter_map(|s| MediaType::parse(s.trim()))
			.collect();
		media_types.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
		Self { media_types }
	}

	/// The header a client sends when it accepts anything.
	pub fn any() -> Self {
		Self {
			media_types: vec![MediaType::new("*", "*")],
		}
	}

	/// Parses an optional header; a missing header accepts anything.
	pub fn from_header(header: Option<&str>) -> Self {
		match header {
			Some(value) if !value.trim().is_empty() => Self::parse(value),
			_ => Self::any(),
		}
	}

	/// Quality the client assigns to `offer`, taken from the most specific
	/// matching range. `None` when no range matches.
	pub fn quality(&self, offer: &MediaType) -> Option<f32> {
		self.media_types
			.iter()
			.filter(|range| range.matches(offer))
			.max_by_key(|range| range.specificity())
			.map(|range| range.quality)
	}

	/// Picks the offer with the highest quality. Ties go to the offer listed
	/// first; offers with quality 0 are never chosen.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::AcceptHeader;
	///
	/// let accept = AcceptHeader::parse("application/json, text/html; q=0.9");
	/// assert_eq!(accept.best_match(&["text/html", "application/json"]), Some("application/json"));
	///
	/// let anything = AcceptHeader::any();
	/// assert_eq!(anything.best_match(&["text/html", "application/json"]), Some("text/html"));
	/// ```
	pub fn best_match<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
		let mut best: Option<(&'a str, f32)> = None;
		for &offer in offers {
			let Some(media_type) = MediaType::parse(offer) else {
				continue;
			};
			let Some(quality) = self.quality(&media_type) else {
				continue;
			};
			if quality <= 0.0 {
				continue;
			}
			if best.is_none_or(|(_, q)| quality > q) {
				best = Some((offer, quality));
			}
		}
		best.map(|(offer, _)| offer)
	}
}

/// Media type conventionally associated with a URL extension.
///
/// # Examples
///
/// ```
/// use trellis_core::negotiation::media_type_for_extension;
///
/// assert_eq!(media_type_for_extension("xml"), Some("text/xml"));
/// assert_eq!(media_type_for_extension("JSON"), Some("application/json"));
/// assert_eq!(media_type_for_extension("bob"), None);
/// ```
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
	let media_type = match ext.to_ascii_lowercase().as_str() {
		"html" | "htm" => "text/html",
		"xhtml" => "application/xhtml+xml",
		"xml" => "text/xml",
		"json" => "application/json",
		"js" => "application/javascript",
		"txt" | "text" => "text/plain",
		"csv" => "text/csv",
		"css" => "text/css",
		"rss" => "application/rss+xml",
		"atom" => "application/atom+xml",
		"pdf" => "application/pdf",
		"png" => "image/png",
		"jpg" | "jpeg" => "image/jpeg",
		"gif" => "image/gif",
		"svg" => "image/svg+xml",
		_ => return None,
	};
	Some(media_type)
}

/// Adds `; charset=utf-8` to textual content types lacking a charset.
///
/// # Examples
///
/// ```
/// use trellis_core::negotiation::with_charset;
///
/// assert_eq!(with_charset("text/html"), "text/html; charset=utf-8");
/// assert_eq!(with_charset("application/json"), "application/json; charset=utf-8");
/// assert_eq!(with_charset("image/png"), "image/png");
/// ```
pub fn with_charset(content_type: &str) -> String {
	let textual = content_type.starts_with("text/")
		|| matches!(
			content_type,
			"application/xhtml+xml" | "application/xml" | "application/json"
		);
	if textual && !content_type.contains("charset") {
		format!("{content_type}; charset=utf-8")
	} else {
		content_type.to_string()
	}
}

/// A language range from `Accept-Language`.
#[derive(Debug, Clone, PartialEq)]
pub struct Language {
	pub code: String,
	pub region: Option<String>,
	pub quality: f32,
}

impl Language {
	/// Parses `en-US;q=0.9`.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_core::negotiation::Language;
	///
	/// let lang = Language::parse("en-US;q=0.9").unwrap();
	/// assert_eq!(lang.code, "en");
	/// assert_eq!(lang.region.as_deref(), Some("US"));
	/// assert_eq!(lang.tag(), "en_US");
	/// ```
	pub fn parse(s: &str) -> Option<Self> {
		let mut parts = s.split(';');
		let tag = parts.next()?.trim();
		if tag.is_empty() || tag == "*" {
			return None;
		}
		let (code, region) = match tag.split_once(['-', '_']) {
			Some((c, r)) => (c.to_ascii_lowercase(), Some(r.to_ascii_uppercase())),
			None => (tag.to_ascii_lowercase(), None),
		};

		let mut quality = 1.0;
		for param in parts {
			if let Some(("q", value)) = param.trim().split_once('=') {
				quality = value.trim().parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
			}
		}
		Some(Self {
			code,
			region,
			quality,
		})
	}

	/// Gettext style tag, `en` or `en_US`.
	pub fn tag(&self) -> String {
		match &self.region {
			Some(region) => format!("{}_{}", self.code, region),
			None => self.code.clone(),
		}
	}
}

/// Parses `Accept-Language` into languages sorted by decreasing quality.
/// Zero-quality entries are dropped.
pub fn parse_accept_language(header: &str) -> Vec<Language> {
	let mut languages: Vec<Language> = header
		.split(',')
		.filter_map(|s| Language::parse(s.trim()))
		.filter(|l| l.quality > 0.0)
		.collect();
	languages.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap_or(Ordering::Equal));
	languages
}
