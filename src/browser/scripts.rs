//! Read-only page probes evaluated by the driver.
//!
//! None of these scripts write to the DOM: locators are computed as CSS
//! paths instead of being stamped onto elements as attributes.

/// Enumerates candidate interactive elements with visibility, occlusion and
/// bounds. Returns a JSON string.
pub const QUERY_ELEMENTS_JS: &str = r#"
(() => {
  const TAGS = new Set(['a','button','input','select','textarea','summary','option']);
  const vw = window.innerWidth, vh = window.innerHeight;

  function cssPath(el) {
    if (el.id && document.querySelectorAll('#' + CSS.escape(el.id)).length === 1) {
      return '#' + CSS.escape(el.id);
    }
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1 && node !== document.documentElement) {
      let part = node.tagName.toLowerCase();
      const parent = node.parentElement;
      if (parent) {
        const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
        if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(node) + 1) + ')';
      }
      parts.unshift(part);
      node = parent;
    }
    return 'html > ' + parts.join(' > ');
  }

  function obscured(el, r) {
    const cx = r.left + r.width / 2, cy = r.top + r.height / 2;
    if (cx < 0 || cy < 0 || cx >= vw || cy >= vh) return false;
    const top = document.elementFromPoint(cx, cy);
    return !!top && top !== el && !el.contains(top) && !top.contains(el);
  }

  const out = [];
  for (const el of document.body.querySelectorAll('*')) {
    const tag = el.tagName.toLowerCase();
    const role = el.getAttribute('role');
    const style = getComputedStyle(el);
    const parentPointer = el.parentElement && getComputedStyle(el.parentElement).cursor === 'pointer';
    const clickable = el.hasAttribute('onclick')
      || (el.hasAttribute('tabindex') && el.tabIndex >= 0)
      || (style.cursor === 'pointer' && !parentPointer);
    const editable = el.isContentEditable && !(el.parentElement && el.parentElement.isContentEditable);
    if (!TAGS.has(tag) && !role && !clickable && !editable) continue;
    const r = el.getBoundingClientRect();
    const visible = style.display !== 'none' && style.visibility !== 'hidden'
      && style.opacity !== '0' && r.width > 0 && r.height > 0;
    out.push({
      locator: cssPath(el),
      tag,
      role,
      text: (el.innerText || el.textContent || '').trim().slice(0, 200),
      ariaLabel: el.getAttribute('aria-label'),
      placeholder: el.getAttribute('placeholder'),
      title: el.getAttribute('title'),
      alt: el.getAttribute('alt'),
      name: el.getAttribute('name'),
      inputType: el.getAttribute('type'),
      href: el.getAttribute('href'),
      value: (typeof el.value === 'string') ? el.value : null,
      disabled: !!el.disabled || el.getAttribute('aria-disabled') === 'true',
      visible,
      obscured: visible && obscured(el, r),
      clickable,
      editable,
      bounds: { x: r.left, y: r.top, width: r.width, height: r.height }
    });
  }
  return JSON.stringify(out);
})()
"#;

/// Collects visible leaf text with its vertical position. Returns a JSON string.
pub const VISIBLE_TEXT_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','TEMPLATE']);
  const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
  const out = [];
  let node;
  while ((node = walker.nextNode()) && out.length < 400) {
    const text = node.textContent.replace(/\s+/g, ' ').trim();
    if (text.length < 2) continue;
    const parent = node.parentElement;
    if (!parent || SKIP.has(parent.tagName)) continue;
    const style = getComputedStyle(parent);
    if (style.display === 'none' || style.visibility === 'hidden') continue;
    const r = parent.getBoundingClientRect();
    if (r.width === 0 || r.height === 0) continue;
    out.push({ text: text.slice(0, 300), top: r.top });
  }
  return JSON.stringify(out);
})()
"#;

/// URL, title, scroll geometry and a DOM hash. Returns a JSON string.
pub const PAGE_METADATA_JS: &str = r#"
(() => {
  const html = document.body ? document.body.innerHTML : '';
  let hash = 5381;
  for (let i = 0; i < html.length; i++) {
    hash = ((hash * 33) ^ html.charCodeAt(i)) >>> 0;
  }
  return JSON.stringify({
    url: location.href,
    title: document.title,
    scroll: {
      y: window.scrollY,
      viewportWidth: window.innerWidth,
      viewportHeight: window.innerHeight,
      documentHeight: document.documentElement.scrollHeight
    },
    domSignature: hash
  });
})()
"#;

/// Build a probe for one locator. The selector is embedded as a JSON string
/// literal so quoting inside it cannot break out of the script.
pub fn probe_js(locator: &str) -> String {
    let selector = serde_json::Value::String(locator.to_string()).to_string();
    format!(
        r#"
(() => {{
  const el = document.querySelector({selector});
  if (!el) return 'null';
  return JSON.stringify({{
    tag: el.tagName.toLowerCase(),
    text: (el.innerText || el.textContent || '').trim().slice(0, 200),
    value: (typeof el.value === 'string') ? el.value : null
  }});
}})()
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_escapes_selector() {
        let js = probe_js(r#"input[name="q"]"#);
        assert!(js.contains(r#"document.querySelector("input[name=\"q\"]")"#));
    }

    #[test]
    fn test_scripts_do_not_write_attributes() {
        for script in [QUERY_ELEMENTS_JS, VISIBLE_TEXT_JS, PAGE_METADATA_JS] {
            assert!(!script.contains("setAttribute"));
        }
    }
}
