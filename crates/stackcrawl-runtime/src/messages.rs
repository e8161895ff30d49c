//! Message tables for loader exceptions
//!
//! Templates keep their `{0}`/`{1}` placeholders; the managed exception fills
//! in the type and assembly names.

/// `COR_E_FILELOAD`
pub const COR_E_FILELOAD: u32 = 0x8013_1621;
/// `COR_E_FILENOTFOUND`
pub const COR_E_FILENOTFOUND: u32 = 0x8007_0002;
/// `COR_E_BADIMAGEFORMAT`
pub const COR_E_BADIMAGEFORMAT: u32 = 0x8007_000B;
/// `E_ACCESSDENIED`
pub const E_ACCESSDENIED: u32 = 0x8007_0005;
/// `FUSION_E_INVALID_NAME`
pub const FUSION_E_INVALID_NAME: u32 = 0x8013_1047;

/// Resource ids understood by [`type_load_message`]
pub mod resource {
    pub const CLASSLOAD_GENERAL: u32 = 0x1771;
    pub const CLASSLOAD_MISSINGMETHOD: u32 = 0x1772;
    pub const CLASSLOAD_FIELDTOOLARGE: u32 = 0x1773;
    pub const CLASSLOAD_BADFORMAT: u32 = 0x1774;
    pub const CLASSLOAD_GENERICTYPE_RECURSIVE: u32 = 0x1775;
    pub const CLASSLOAD_EXPLICIT_LAYOUT: u32 = 0x1776;
}

const TYPE_LOAD_MESSAGES: &[(u32, &str)] = &[
    (
        resource::CLASSLOAD_GENERAL,
        "Could not load type '{0}' from assembly '{1}'.",
    ),
    (
        resource::CLASSLOAD_MISSINGMETHOD,
        "Method '{2}' in type '{0}' from assembly '{1}' does not have an implementation.",
    ),
    (
        resource::CLASSLOAD_FIELDTOOLARGE,
        "Size of field of type '{0}' from assembly '{1}' is too large.",
    ),
    (
        resource::CLASSLOAD_BADFORMAT,
        "Could not load type '{0}' from assembly '{1}' because the format is invalid.",
    ),
    (
        resource::CLASSLOAD_GENERICTYPE_RECURSIVE,
        "Could not load type '{0}' from assembly '{1}' because it has recursive generic definition.",
    ),
    (
        resource::CLASSLOAD_EXPLICIT_LAYOUT,
        "Could not load type '{0}' from assembly '{1}' because it contains an object field at offset '{3}' that is incorrectly aligned or overlapped by a non-object field.",
    ),
];

const HRESULT_MESSAGES: &[(u32, &str)] = &[
    (COR_E_FILENOTFOUND, "The system cannot find the file specified."),
    (
        COR_E_BADIMAGEFORMAT,
        "An attempt was made to load a program with an incorrect format.",
    ),
    (E_ACCESSDENIED, "Access is denied."),
    (FUSION_E_INVALID_NAME, "The given assembly name was invalid."),
    (COR_E_FILELOAD, "Could not load file or assembly."),
];

/// Template for a type-load failure; unknown ids fall back to the general one
pub fn type_load_message(resource_id: u32) -> &'static str {
    lookup(TYPE_LOAD_MESSAGES, resource_id)
        .or_else(|| lookup(TYPE_LOAD_MESSAGES, resource::CLASSLOAD_GENERAL))
        .unwrap_or("Could not load type '{0}' from assembly '{1}'.")
}

/// Template for a file-load failure with the given HRESULT
pub fn file_load_message(hresult: u32) -> String {
    match hresult {
        COR_E_FILELOAD => "Could not load file or assembly '{0}'.".to_string(),
        _ => format!(
            "Could not load file or assembly '{{0}}'. {}",
            hresult_message(hresult)
        ),
    }
}

/// System text for `hresult`
pub fn hresult_message(hresult: u32) -> String {
    match lookup(HRESULT_MESSAGES, hresult) {
        Some(text) => text.to_string(),
        None => format!("Exception from HRESULT: 0x{hresult:08X}"),
    }
}

fn lookup(table: &[(u32, &'static str)], key: u32) -> Option<&'static str> {
    table.iter().find(|(id, _)| *id == key).map(|(_, text)| *text)
}
