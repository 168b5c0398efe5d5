//! ---
//! mfg_section: "05-networking-external-interfaces"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Content negotiation for twin state representations."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;

use mf_model::{DeviceKey, DeviceState};

/// Media type of the SenML rendering.
pub const SENML_JSON: &str = "application/senml+json";

/// Negotiated rendering of a state resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Full state object, the default.
    Json,
    /// Compact sensor-measurement pack.
    Senml,
    /// Primary status token or the state's natural text form.
    Text,
}

impl Representation {
    /// `Content-Type` of this representation.
    pub fn content_type(self) -> &'static str {
        match self {
            Representation::Json => "application/json",
            Representation::Senml => SENML_JSON,
            Representation::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Pick a representation from the request's `Accept` header. A missing
/// header means JSON; entries are weighed by their `q` parameter (default
/// 1.0, ties broken by header order); an `Accept` that names none of the
/// supported media types yields `None` and the caller answers 406.
pub fn negotiate(headers: &HeaderMap) -> Option<Representation> {
    let Some(accept) = headers.get(header::ACCEPT) else {
        return Some(Representation::Json);
    };
    let accept = accept.to_str().ok()?;

    let mut best: Option<(f32, Representation)> = None;
    for entry in accept.split(',') {
        let mut parts = entry.split(';');
        let media_type = parts.next().unwrap_or("").trim();
        let quality = parts
            .filter_map(|param| param.trim().strip_prefix("q="))
            .next()
            .and_then(|value| value.parse::<f32>().ok())
            .unwrap_or(1.0);
        let candidate = match media_type {
            "*/*" | "application/*" | "application/json" => Representation::Json,
            SENML_JSON => Representation::Senml,
            "text/*" | "text/plain" => Representation::Text,
            _ => continue,
        };
        if best.map_or(true, |(best_quality, _)| quality > best_quality) {
            best = Some((quality, candidate));
        }
    }
    best.map(|(_, representation)| representation)
}

/// Render `state` in `representation`, with the matching `Content-Type`.
pub fn render(key: &DeviceKey, state: &DeviceState, representation: Representation) -> Response {
    match representation {
        Representation::Json => Json(state).into_response(),
        Representation::Senml => (
            [(header::CONTENT_TYPE, SENML_JSON)],
            Json(state.to_senml(&format!("{}/", key.path()))),
        )
            .into_response(),
        Representation::Text => state.status_text().into_response(),
    }
}

/// Render `state` as the text frame pushed to an observing client.
pub fn render_frame(
    key: &DeviceKey,
    state: &DeviceState,
    representation: Representation,
) -> Option<String> {
    match representation {
        Representation::Json => serde_json::to_string(state).ok(),
        Representation::Senml => {
            serde_json::to_string(&state.to_senml(&format!("{}/", key.path()))).ok()
        }
        Representation::Text => Some(state.status_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(accept: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(accept) = accept {
            map.insert(header::ACCEPT, HeaderValue::from_str(accept).unwrap());
        }
        map
    }

    #[test]
    fn missing_and_wildcard_accept_default_to_json() {
        assert_eq!(negotiate(&headers(None)), Some(Representation::Json));
        assert_eq!(negotiate(&headers(Some("*/*"))), Some(Representation::Json));
    }

    #[test]
    fn specific_media_types_are_honoured() {
        assert_eq!(
            negotiate(&headers(Some("application/senml+json"))),
            Some(Representation::Senml)
        );
        assert_eq!(
            negotiate(&headers(Some("text/plain; q=0.9"))),
            Some(Representation::Text)
        );
        // First supported entry of a list wins when weights are equal.
        assert_eq!(
            negotiate(&headers(Some("application/xml, text/plain"))),
            Some(Representation::Text)
        );
    }

    #[test]
    fn quality_weights_order_the_candidates() {
        assert_eq!(
            negotiate(&headers(Some("text/plain;q=0.1, application/json;q=0.9"))),
            Some(Representation::Json)
        );
        assert_eq!(
            negotiate(&headers(Some(
                "application/json;q=0.2, application/senml+json;q=0.8"
            ))),
            Some(Representation::Senml)
        );
        // Unweighted entries default to q=1 and beat weighted ones.
        assert_eq!(
            negotiate(&headers(Some("application/json;q=0.5, text/plain"))),
            Some(Representation::Text)
        );
    }

    #[test]
    fn unsupported_accept_yields_none() {
        assert_eq!(negotiate(&headers(Some("application/xml"))), None);
        assert_eq!(negotiate(&headers(Some("image/png, audio/ogg"))), None);
    }
}
