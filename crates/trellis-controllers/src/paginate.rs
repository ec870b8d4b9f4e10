//! Pagination of list outputs.
//!
//! A paginated method reads the page number from its arguments before
//! validation, then slices the named list out of its output before
//! rendering. The resulting [`Page`] is published in
//! `tmpl_context.paginators` and in the `paginators` key of the output.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::Result;

use crate::context::RequestContext;
use crate::hooks::{ControllerEvent, ControllerHook, HookName};
use crate::reply::Reply;

/// A `paginate` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginateSpec {
	/// Key of the list in the output.
	pub name: String,
	pub items_per_page: usize,
	/// Request parameter carrying the page number.
	pub page_param: String,
	/// When set, clients may choose the page size through the
	/// `items_per_page` parameter, up to this bound.
	pub max_items_per_page: Option<usize>,
}

impl PaginateSpec {
	pub fn new(name: impl Into<String>, items_per_page: usize) -> Self {
		Self {
			name: name.into(),
			items_per_page: items_per_page.max(1),
			page_param: "page".to_string(),
			max_items_per_page: None,
		}
	}

	pub fn page_param(mut self, param: impl Into<String>) -> Self {
		self.page_param = param.into();
		self
	}

	pub fn max_items_per_page(mut self, max: usize) -> Self {
		self.max_items_per_page = Some(max.max(1));
		self
	}

	/// The hooks implementing this registration.
	pub(crate) fn hooks(&self) -> [(HookName, ControllerHook); 2] {
		let spec = Arc::new(self.clone());
		let reader = Arc::clone(&spec);
		let before_validate: ControllerHook = Arc::new(move |ctx: &mut RequestContext, event: &mut ControllerEvent<'_>| {
			if let ControllerEvent::BeforeValidate { args, .. } = event {
				let page = args
					.remove(&reader.page_param)
					.and_then(|v| parse_positive(&v))
					.unwrap_or(1);
				let mut per_page = reader.items_per_page;
				if let Some(max) = reader.max_items_per_page
					&& let Some(requested) = args.remove("items_per_page").and_then(|v| parse_positive(&v))
				{
					per_page = requested.min(max);
				}
				let mut requests = ctx.locals.get::<PageRequests>().unwrap_or_default();
				requests.0.insert(reader.name.clone(), (page, per_page));
				ctx.locals.insert(requests);
			}
			Ok(())
		});
		let before_render: ControllerHook = Arc::new(move |ctx: &mut RequestContext, event: &mut ControllerEvent<'_>| {
			if let ControllerEvent::BeforeRender { output, .. } = event {
				paginate_output(ctx, &spec, output)?;
			}
			Ok(())
		});
		[
			(HookName::BeforeValidate, before_validate),
			(HookName::BeforeRender, before_render),
		]
	}
}

#[derive(Debug, Clone, Default)]
struct PageRequests(HashMap<String, (usize, usize)>);

fn parse_positive(value: &Value) -> Option<usize> {
	let n = match value {
		Value::Number(n) => n.as_u64()?,
		Value::String(s) => s.trim().parse().ok()?,
		Value::Array(items) => return items.last().and_then(parse_positive),
		_ => return None,
	};
	usize::try_from(n).ok().filter(|n| *n > 0)
}

/// Links to the neighbouring pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageLinks {
	pub first: Option<String>,
	pub prev: Option<String>,
	pub next: Option<String>,
	pub last: Option<String>,
}

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
	pub page: usize,
	pub items_per_page: usize,
	pub item_count: usize,
	pub page_count: usize,
	/// One-based index of the first item shown, 0 when empty.
	pub first_item: usize,
	pub last_item: usize,
	pub links: PageLinks,
	/// Ready-made HTML for the links.
	pub pager: String,
}

impl Page {
	/// Computes the page, clamping `page` into range. `link` builds the URL
	/// of a page number.
	///
	/// # Examples
	///
	/// ```
	/// use trellis_controllers::Page;
	///
	/// let page = Page::compute(42, 2, 10, |n| format!("/items?page={n}"));
	/// assert_eq!((page.first_item, page.last_item), (11, 20));
	/// assert_eq!(page.page_count, 5);
	/// assert_eq!(page.links.next.as_deref(), Some("/items?page=3"));
	///
	/// let past_end = Page::compute(42, 99, 10, |n| n.to_string());
	/// assert_eq!(past_end.page, 5);
	/// ```
	pub fn compute(item_count: usize, page: usize, items_per_page: usize, link: impl Fn(usize) -> String) -> Self {
		let items_per_page = items_per_page.max(1);
		let page_count = item_count.div_ceil(items_per_page).max(1);
		let page = page.clamp(1, page_count);
		let first_item = if item_count == 0 {
			0
		} else {
			(page - 1) * items_per_page + 1
		};
		let last_item = (page * items_per_page).min(item_count);
		let links = PageLinks {
			first: (page > 1).then(|| link(1)),
			prev: (page > 1).then(|| link(page - 1)),
			next: (page < page_count).then(|| link(page + 1)),
			last: (page < page_count).then(|| link(page_count)),
		};
		let mut page = Self {
			page,
			items_per_page,
			item_count,
			page_count,
			first_item,
			last_item,
			links,
			pager: String::new(),
		};
		page.pager = page.pager_html();
		page
	}

	/// Offsets of the items on this page.
	pub fn range(&self) -> std::ops::Range<usize> {
		if self.item_count == 0 {
			return 0..0;
		}
		(self.first_item - 1)..self.last_item
	}

	pub fn pager_html(&self) -> String {
		let mut html = String::from("<div class=\"pager\">");
		for (label, href) in [
			("&lt;&lt;", &self.links.first),
			("&lt;", &self.links.prev),
			("&gt;", &self.links.next),
			("&gt;&gt;", &self.links.last),
		] {
			if let Some(href) = href {
				html.push_str(&format!("<a href=\"{}\">{label}</a>", escape_attr(href)));
			}
		}
		html.push_str(&format!(
			"<span class=\"pager_curpage\">{} / {}</span></div>",
			self.page, self.page_count
		));
		html
	}
}

fn escape_attr(value: &str) -> String {
	value
		.replace('&', "&amp;")
		.replace('"', "&quot;")
		.replace('<', "&lt;")
}

fn page_link(ctx: &RequestContext, spec: &PaginateSpec, per_page: usize, n: usize) -> String {
	let mut params = ctx.request.query_params();
	params.insert(spec.page_param.clone(), Value::from(n.to_string()));
	if spec.max_items_per_page.is_some() && per_page != spec.items_per_page {
		params.insert("items_per_page".into(), Value::from(per_page.to_string()));
	}
	ctx.url(ctx.request.path(), Some(&params))
}

fn paginate_output(ctx: &mut RequestContext, spec: &PaginateSpec, output: &mut Reply) -> Result<()> {
	let Some(map) = output.as_object_mut() else {
		return Ok(());
	};
	let Some(Value::Array(items)) = map.get_mut(&spec.name) else {
		return Ok(());
	};
	let (requested, per_page) = ctx
		.locals
		.get::<PageRequests>()
		.and_then(|r| r.0.get(&spec.name).copied())
		.unwrap_or((1, spec.items_per_page));

	let page = Page::compute(items.len(), requested, per_page, |n| page_link(ctx, spec, per_page, n));
	let range = page.range();
	let sliced: Vec<Value> = items.drain(..).skip(range.start).take(range.len()).collect();
	*items = sliced;
	tracing::debug!(name = %spec.name, page = page.page, of = page.page_count, "paginated output");

	let page_value = serde_json::to_value(&page)?;
	let paginators = map
		.entry("paginators")
		.or_insert_with(|| Value::Object(Map::new()));
	if let Value::Object(paginators) = paginators {
		paginators.insert(spec.name.clone(), page_value.clone());
	}

	if !ctx.tmpl_context.contains("paginators") {
		ctx.tmpl_context.set("paginators", Value::Object(Map::new()));
	}
	if let Some(Value::Object(paginators)) = ctx.tmpl_context.get_mut("paginators") {
		paginators.insert(spec.name.clone(), page_value);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	#[case(0, 1, 0, 0, 1)]
	#[case(42, 1, 1, 10, 5)]
	#[case(42, 5, 41, 42, 5)]
	#[case(10, 1, 1, 10, 1)]
	fn test_compute_bounds(
		#[case] count: usize,
		#[case] page: usize,
		#[case] first: usize,
		#[case] last: usize,
		#[case] pages: usize,
	) {
		let page = Page::compute(count, page, 10, |n| n.to_string());
		assert_eq!(page.first_item, first);
		assert_eq!(page.last_item, last);
		assert_eq!(page.page_count, pages);
	}

	#[rstest]
	fn test_links_on_edges() {
		let first = Page::compute(42, 1, 10, |n| n.to_string());
		assert_eq!(first.links.first, None);
		assert_eq!(first.links.prev, None);
		assert_eq!(first.links.last.as_deref(), Some("5"));

		let last = Page::compute(42, 0, 10, |n| n.to_string());
		assert_eq!(last.page, 1);
	}

	#[rstest]
	fn test_pager_html_escapes_links() {
		let page = Page::compute(30, 2, 10, |n| format!("/l?a=1&page={n}"));
		assert!(page.pager.contains("href=\"/l?a=1&amp;page=1\""));
		assert!(page.pager.contains("2 / 3"));
	}

	#[rstest]
	#[case(json!("3"), Some(3))]
	#[case(json!(4), Some(4))]
	#[case(json!("0"), None)]
	#[case(json!("x"), None)]
	#[case(json!(["1", "2"]), Some(2))]
	fn test_parse_positive(#[case] value: Value, #[case] expected: Option<usize>) {
		assert_eq!(parse_positive(&value), expected);
	}
}
