//! Deterministic projection of a declaration into the regulator's
//! form 270.00 XML tree. The same declaration, items and layout always
//! produce the same bytes; the SHA-256 of those bytes is the export's
//! content hash.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use utils::{sha256_hex, AmountRounding, DateNormalizer};

use crate::models::{Declaration, DeclarationKind, XmlFieldMap};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";
const FNO_OPEN: &str = "<fno code=\"270.00\" formatVersion=\"1\" version=\"2\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">";

/// Serializes the declaration into the full `<fno>` tree: eight `<form>`
/// blocks of `<sheet>`/`<field>` elements in the layout's declared
/// order.
pub fn project(
    declaration: &Declaration,
    items: &BTreeMap<String, Decimal>,
    layout: &[XmlFieldMap],
) -> String {
    let mut ordered: Vec<&XmlFieldMap> = layout.iter().collect();
    ordered.sort_by(|a, b| {
        (&a.form_code, &a.application_code, a.position)
            .cmp(&(&b.form_code, &b.application_code, b.position))
    });

    let mut out = String::with_capacity(4096);
    out.push_str(XML_DECLARATION);
    out.push('\n');
    out.push_str(FNO_OPEN);
    out.push('\n');

    let mut open_form: Option<&str> = None;
    let mut open_sheet: Option<&str> = None;

    for field in &ordered {
        if open_form != Some(field.form_code.as_str()) {
            close_sheet(&mut out, &mut open_sheet);
            close_form(&mut out, &mut open_form);
            out.push_str("  <form name=\"");
            out.push_str(&form_name(&field.form_code));
            out.push_str("\">\n");
            open_form = Some(field.form_code.as_str());
        }
        if open_sheet != Some(field.application_code.as_str()) {
            close_sheet(&mut out, &mut open_sheet);
            out.push_str("    <sheet name=\"");
            out.push_str(&escape_xml(&field.application_code));
            out.push_str("\">\n");
            open_sheet = Some(field.application_code.as_str());
        }

        let value = field_value(declaration, items, field);
        out.push_str("      <field name=\"");
        out.push_str(&escape_xml(&field.xml_field_name));
        if value.is_empty() {
            out.push_str("\"/>\n");
        } else {
            out.push_str("\">");
            out.push_str(&escape_xml(&value));
            out.push_str("</field>\n");
        }
    }

    close_sheet(&mut out, &mut open_sheet);
    close_form(&mut out, &mut open_form);
    out.push_str("</fno>\n");
    out
}

fn close_sheet(out: &mut String, open_sheet: &mut Option<&str>) {
    if open_sheet.take().is_some() {
        out.push_str("    </sheet>\n");
    }
}

fn close_form(out: &mut String, open_form: &mut Option<&str>) {
    if open_form.take().is_some() {
        out.push_str("  </form>\n");
    }
}

/// `270.01` → `form_270_01`.
fn form_name(form_code: &str) -> String {
    format!("form_{}", form_code.replace('.', "_"))
}

fn field_value(
    declaration: &Declaration,
    items: &BTreeMap<String, Decimal>,
    field: &XmlFieldMap,
) -> String {
    match &field.logical_field {
        Some(logical) => items
            .get(logical)
            .map(|amount| format_money(*amount))
            .unwrap_or_default(),
        None => header_value(declaration, &field.xml_field_name),
    }
}

/// Money cells carry whole tenge as ASCII digits; zero and missing
/// values are empty elements.
fn format_money(amount: Decimal) -> String {
    if amount.is_zero() {
        return String::new();
    }
    AmountRounding::to_whole(amount).to_string()
}

fn format_flag(set: bool) -> String {
    if set {
        "1".to_string()
    } else {
        String::new()
    }
}

/// Header cells filled from declaration attributes rather than computed
/// items. Unrecognized names are the placeholder grid rows of the later
/// appendices, emitted empty.
fn header_value(declaration: &Declaration, name: &str) -> String {
    let header = &declaration.header;
    match name {
        "iin" => header.iin.clone(),
        "period_year" => declaration.tax_year.to_string(),
        "creation_date" => DateNormalizer::to_form(declaration.created_at.date_naive()),
        "fio1" => header.last_name.clone(),
        "fio2" => header.first_name.clone(),
        "fio3" => header.middle_name.clone().unwrap_or_default(),
        "email" => header.email.clone().unwrap_or_default(),
        "payer_phone_number" => header.phone.clone().unwrap_or_default(),
        "dt_main" => format_flag(declaration.kind == DeclarationKind::Main),
        "dt_regular" => format_flag(declaration.kind == DeclarationKind::Regular),
        "dt_additional" => format_flag(declaration.kind == DeclarationKind::Additional),
        "dt_notice" => format_flag(declaration.kind == DeclarationKind::Notice),
        _ => {
            if let Some(appendix) = name.strip_prefix("pril_") {
                let flag = format!("pril_{}", appendix);
                format_flag(declaration.flags.get(&flag).copied().unwrap_or(false))
            } else {
                String::new()
            }
        }
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Post-generation sanity check on the serialized document.
pub fn structural_check(xml: &str) -> bool {
    xml.starts_with("<?xml")
        && xml.contains("<fno")
        && xml.contains("form_270_00")
        && xml.contains("form_270_01")
}

/// Content hash of the serialized document.
pub fn content_hash(xml: &str) -> String {
    sha256_hex(xml.as_bytes())
}
