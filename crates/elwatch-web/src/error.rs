#![forbid(unsafe_code)]

//! Errors raised by the browser host.

/// Failures reported by browser APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebError {
    /// A DOM call threw; carries the exception's message.
    Js(String),
    /// No `window` or `window.document` in this global scope.
    NoDocument,
    /// The document has neither a `body` nor a `documentElement`.
    NoRoot,
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Js(msg) => write!(f, "DOM exception: {msg}"),
            Self::NoDocument => write!(f, "no document in this global scope"),
            Self::NoRoot => write!(f, "document has no body or document element"),
        }
    }
}

impl std::error::Error for WebError {}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for WebError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        use wasm_bindgen::JsCast;

        let msg = match value.dyn_ref::<js_sys::Error>() {
            Some(err) => String::from(err.message()),
            None => value.as_string().unwrap_or_else(|| format!("{value:?}")),
        };
        Self::Js(msg)
    }
}

#[cfg(target_arch = "wasm32")]
impl From<WebError> for wasm_bindgen::JsValue {
    fn from(err: WebError) -> Self {
        js_sys::Error::new(&err.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_messages() {
        assert_eq!(
            WebError::Js("SyntaxError: 'div:' is not a valid selector".into()).to_string(),
            "DOM exception: SyntaxError: 'div:' is not a valid selector"
        );
        assert_eq!(
            WebError::NoRoot.to_string(),
            "document has no body or document element"
        );
    }
}
