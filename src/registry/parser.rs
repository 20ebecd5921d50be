use crate::error::FetchError;
use crate::models::{Availability, RegistrationDetails};
use chadselect::ChadSelect;

// Matched against the markup, so a marker div with no text still counts.
// The class must appear as a whole token of the class attribute.
const AVAILABLE_MARKER: &str =
    r#"regex:(<div[^>]*\bclass\s*=\s*["'](?:[^"']*\s)?si-dom-disponible(?:\s[^"']*)?["'])"#;
const REGISTERED_MARKER: &str =
    r#"regex:(<div[^>]*\bclass\s*=\s*["'](?:[^"']*\s)?no-dom-disponible(?:\s[^"']*)?["'])"#;
const DETAIL_CELLS: &str = "css:table.table td";

/// Upper bound on table cells scanned for registrant data.
const MAX_DETAIL_CELLS: usize = 64;

const OWNER_PREFIX: &str = "Nombre y Apellido:";
const DOCUMENT_PREFIX: &str = "CUIT/CUIL/ID:";
const REGISTRATION_PREFIX: &str = "Fecha de Alta:";
const EXPIRATION_PREFIX: &str = "Fecha de vencimiento:";

/// Classifies a registry result page.
///
/// A page showing neither the "available" nor the "not available" block is
/// an error, never treated as available.
pub fn parse_page(html: &str) -> Result<Availability, FetchError> {
    let mut cs = ChadSelect::new();
    cs.add_html(html.to_string());

    if !cs.select(0, AVAILABLE_MARKER).is_empty() {
        return Ok(Availability::Available);
    }

    if cs.select(0, REGISTERED_MARKER).is_empty() {
        return Err(FetchError::UnparsableResponse(
            "page has neither an available nor a registered marker".to_string(),
        ));
    }

    let mut details = RegistrationDetails::default();
    for index in (0..).take(MAX_DETAIL_CELLS) {
        let cell = cs.select(index, DETAIL_CELLS);
        if cell.is_empty() {
            break;
        }
        apply_detail_cell(&mut details, cell.trim());
    }

    Ok(Availability::Registered(details))
}

fn apply_detail_cell(details: &mut RegistrationDetails, text: &str) {
    let slot = [
        (OWNER_PREFIX, &mut details.owner),
        (DOCUMENT_PREFIX, &mut details.document_id),
        (REGISTRATION_PREFIX, &mut details.registration_date),
        (EXPIRATION_PREFIX, &mut details.expiration_date),
    ]
    .into_iter()
    .find_map(|(prefix, slot)| text.find(prefix).map(|at| (at + prefix.len(), slot)));

    if let Some((value_start, slot)) = slot {
        let value = text[value_start..].trim();
        if !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }
}
