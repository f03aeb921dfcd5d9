//! Workbook-structure and worksheet protection on plain XLSX packages.
//!
//! Protection here is the editing lock Excel applies through "Protect Workbook" / "Protect
//! Sheet". It is not encryption: the package stays readable, and the password is only stored as
//! a hash on the `<workbookProtection>` / `<sheetProtection>` element.

use crate::hash::{PasswordHash, ProtectionHash};
use crate::package::{self, SheetPart, WORKBOOK_PART};
use crate::xml::{child_element_attributes, parse_xml_bool, parse_xml_u16_hex, replace_child_element};
use crate::ProtectionError;

/// Root children of `<workbook>` that follow `<workbookProtection>` in schema order.
const WORKBOOK_PROTECTION_FOLLOWERS: &[&str] = &[
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
    "definedNames",
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Root children of `<worksheet>` that follow `<sheetProtection>` in schema order.
const SHEET_PROTECTION_FOLLOWERS: &[&str] = &[
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// `<workbookProtection>` state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkbookProtection {
    /// Sheets cannot be added, moved, renamed or deleted.
    pub lock_structure: bool,
    pub lock_windows: bool,
    pub password_hash: Option<PasswordHash>,
}

impl WorkbookProtection {
    fn from_attributes(attrs: &[(String, String)]) -> Result<Self, ProtectionError> {
        let mut out = Self::default();
        let mut modern = ModernHashAttrs::default();
        for (key, value) in attrs {
            match key.as_str() {
                "lockStructure" => out.lock_structure = parse_xml_bool(value),
                "lockWindows" => out.lock_windows = parse_xml_bool(value),
                "workbookPassword" => {
                    out.password_hash = parse_xml_u16_hex(value)
                        .filter(|hash| *hash != 0)
                        .map(PasswordHash::Legacy);
                }
                "workbookAlgorithmName" => modern.algorithm_name = Some(value.clone()),
                "workbookHashValue" => modern.hash_value = Some(value.clone()),
                "workbookSaltValue" => modern.salt_value = Some(value.clone()),
                "workbookSpinCount" => modern.spin_count = Some(value.clone()),
                _ => {}
            }
        }
        if let Some(hash) = modern.build()? {
            out.password_hash = Some(PasswordHash::Modern(hash));
        }
        Ok(out)
    }

    fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        match &self.password_hash {
            Some(PasswordHash::Legacy(hash)) => {
                attrs.push(("workbookPassword", format!("{hash:04X}")));
            }
            Some(PasswordHash::Modern(hash)) => {
                attrs.push(("workbookAlgorithmName", hash.algorithm_name.clone()));
                attrs.push(("workbookHashValue", hash.hash_value_base64()));
                attrs.push(("workbookSaltValue", hash.salt_value_base64()));
                attrs.push(("workbookSpinCount", hash.spin_count.to_string()));
            }
            None => {}
        }
        if self.lock_structure {
            attrs.push(("lockStructure", "1".to_string()));
        }
        if self.lock_windows {
            attrs.push(("lockWindows", "1".to_string()));
        }
        attrs
    }
}

/// `<sheetProtection>` state.
///
/// Each flag mirrors the SpreadsheetML attribute of the same name: `true` means the operation is
/// *locked* while the sheet is protected. [`SheetProtection::default`] is what Excel writes for a
/// freshly protected sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetProtection {
    /// Protection is enabled.
    pub sheet: bool,
    pub objects: bool,
    pub scenarios: bool,
    pub format_cells: bool,
    pub format_columns: bool,
    pub format_rows: bool,
    pub insert_columns: bool,
    pub insert_rows: bool,
    pub insert_hyperlinks: bool,
    pub delete_columns: bool,
    pub delete_rows: bool,
    pub select_locked_cells: bool,
    pub select_unlocked_cells: bool,
    pub sort: bool,
    pub auto_filter: bool,
    pub pivot_tables: bool,
    pub password_hash: Option<PasswordHash>,
}

impl Default for SheetProtection {
    fn default() -> Self {
        Self {
            sheet: true,
            objects: true,
            scenarios: true,
            ..Self::schema_defaults()
        }
    }
}

impl SheetProtection {
    /// Protection that still lets users do everything except edit locked cells.
    pub fn allow_all() -> Self {
        Self {
            sheet: true,
            objects: false,
            scenarios: false,
            format_cells: false,
            format_columns: false,
            format_rows: false,
            insert_columns: false,
            insert_rows: false,
            insert_hyperlinks: false,
            delete_columns: false,
            delete_rows: false,
            select_locked_cells: false,
            select_unlocked_cells: false,
            sort: false,
            auto_filter: false,
            pivot_tables: false,
            password_hash: None,
        }
    }

    // Values an attribute takes when it is absent from the element.
    fn schema_defaults() -> Self {
        Self {
            sheet: false,
            objects: false,
            scenarios: false,
            format_cells: true,
            format_columns: true,
            format_rows: true,
            insert_columns: true,
            insert_rows: true,
            insert_hyperlinks: true,
            delete_columns: true,
            delete_rows: true,
            select_locked_cells: false,
            select_unlocked_cells: false,
            sort: true,
            auto_filter: true,
            pivot_tables: true,
            password_hash: None,
        }
    }

    fn flags(&self) -> [(&'static str, bool); 16] {
        [
            ("sheet", self.sheet),
            ("objects", self.objects),
            ("scenarios", self.scenarios),
            ("formatCells", self.format_cells),
            ("formatColumns", self.format_columns),
            ("formatRows", self.format_rows),
            ("insertColumns", self.insert_columns),
            ("insertRows", self.insert_rows),
            ("insertHyperlinks", self.insert_hyperlinks),
            ("deleteColumns", self.delete_columns),
            ("deleteRows", self.delete_rows),
            ("selectLockedCells", self.select_locked_cells),
            ("selectUnlockedCells", self.select_unlocked_cells),
            ("sort", self.sort),
            ("autoFilter", self.auto_filter),
            ("pivotTables", self.pivot_tables),
        ]
    }

    fn flag_mut(&mut self, name: &str) -> Option<&mut bool> {
        Some(match name {
            "sheet" => &mut self.sheet,
            "objects" => &mut self.objects,
            "scenarios" => &mut self.scenarios,
            "formatCells" => &mut self.format_cells,
            "formatColumns" => &mut self.format_columns,
            "formatRows" => &mut self.format_rows,
            "insertColumns" => &mut self.insert_columns,
            "insertRows" => &mut self.insert_rows,
            "insertHyperlinks" => &mut self.insert_hyperlinks,
            "deleteColumns" => &mut self.delete_columns,
            "deleteRows" => &mut self.delete_rows,
            "selectLockedCells" => &mut self.select_locked_cells,
            "selectUnlockedCells" => &mut self.select_unlocked_cells,
            "sort" => &mut self.sort,
            "autoFilter" => &mut self.auto_filter,
            "pivotTables" => &mut self.pivot_tables,
            _ => return None,
        })
    }

    fn from_attributes(attrs: &[(String, String)]) -> Result<Self, ProtectionError> {
        let mut out = Self::schema_defaults();
        let mut modern = ModernHashAttrs::default();
        for (key, value) in attrs {
            if let Some(flag) = out.flag_mut(key) {
                *flag = parse_xml_bool(value);
                continue;
            }
            match key.as_str() {
                "password" => {
                    out.password_hash = parse_xml_u16_hex(value)
                        .filter(|hash| *hash != 0)
                        .map(PasswordHash::Legacy);
                }
                "algorithmName" => modern.algorithm_name = Some(value.clone()),
                "hashValue" => modern.hash_value = Some(value.clone()),
                "saltValue" => modern.salt_value = Some(value.clone()),
                "spinCount" => modern.spin_count = Some(value.clone()),
                _ => {}
            }
        }
        if let Some(hash) = modern.build()? {
            out.password_hash = Some(PasswordHash::Modern(hash));
        }
        Ok(out)
    }

    fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::new();
        match &self.password_hash {
            Some(PasswordHash::Legacy(hash)) => attrs.push(("password", format!("{hash:04X}"))),
            Some(PasswordHash::Modern(hash)) => {
                attrs.push(("algorithmName", hash.algorithm_name.clone()));
                attrs.push(("hashValue", hash.hash_value_base64()));
                attrs.push(("saltValue", hash.salt_value_base64()));
                attrs.push(("spinCount", hash.spin_count.to_string()));
            }
            None => {}
        }
        let defaults = Self::schema_defaults().flags();
        for ((name, value), (_, default)) in self.flags().into_iter().zip(defaults) {
            if value != default {
                attrs.push((name, if value { "1" } else { "0" }.to_string()));
            }
        }
        attrs
    }
}

#[derive(Default)]
struct ModernHashAttrs {
    algorithm_name: Option<String>,
    hash_value: Option<String>,
    salt_value: Option<String>,
    spin_count: Option<String>,
}

impl ModernHashAttrs {
    fn build(self) -> Result<Option<ProtectionHash>, ProtectionError> {
        match (self.algorithm_name, self.hash_value) {
            (Some(algorithm), Some(hash)) => ProtectionHash::from_attributes(
                &algorithm,
                &hash,
                self.salt_value.as_deref().unwrap_or(""),
                self.spin_count.as_deref().unwrap_or("0"),
            )
            .map(Some),
            _ => Ok(None),
        }
    }
}

/// Protection state of one worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetProtectionState {
    pub name: String,
    /// Package part holding the worksheet XML, e.g. `xl/worksheets/sheet1.xml`.
    pub part: String,
    pub protection: Option<SheetProtection>,
}

/// Protection state of a whole workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkbookProtectionState {
    pub workbook: Option<WorkbookProtection>,
    pub sheets: Vec<SheetProtectionState>,
}

impl WorkbookProtectionState {
    pub fn sheet(&self, name: &str) -> Option<&SheetProtectionState> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Read workbook and per-sheet protection from an XLSX package.
pub fn read_protection(xlsx: &[u8]) -> Result<WorkbookProtectionState, ProtectionError> {
    let mut archive = package::open_archive(xlsx)?;
    let workbook_xml = package::read_part(&mut archive, WORKBOOK_PART)?;
    let workbook = child_element_attributes(&workbook_xml, "workbookProtection")?
        .map(|attrs| WorkbookProtection::from_attributes(&attrs))
        .transpose()?;

    let mut sheets = Vec::new();
    for SheetPart { name, part } in package::sheet_parts(&mut archive)? {
        let sheet_xml = package::read_part(&mut archive, &part)?;
        let protection = child_element_attributes(&sheet_xml, "sheetProtection")?
            .map(|attrs| SheetProtection::from_attributes(&attrs))
            .transpose()?;
        sheets.push(SheetProtectionState {
            name,
            part,
            protection,
        });
    }

    Ok(WorkbookProtectionState { workbook, sheets })
}

/// Set `<workbookProtection>`, replacing any existing element.
pub fn protect_workbook(
    xlsx: &[u8],
    protection: &WorkbookProtection,
) -> Result<Vec<u8>, ProtectionError> {
    let mut archive = package::open_archive(xlsx)?;
    let workbook_xml = package::read_part(&mut archive, WORKBOOK_PART)?;
    let attrs = protection.to_attributes();
    let updated = replace_child_element(
        &workbook_xml,
        "workbookProtection",
        WORKBOOK_PROTECTION_FOLLOWERS,
        Some(attrs.as_slice()),
    )?;
    log::debug!("protecting workbook structure");
    package::rewrite_part(xlsx, WORKBOOK_PART, &updated)
}

/// Remove `<workbookProtection>`.
///
/// When the element carries a password hash, `password` must match it. An unprotected workbook
/// is returned unchanged.
pub fn unprotect_workbook(xlsx: &[u8], password: &str) -> Result<Vec<u8>, ProtectionError> {
    let mut archive = package::open_archive(xlsx)?;
    let workbook_xml = package::read_part(&mut archive, WORKBOOK_PART)?;
    let Some(attrs) = child_element_attributes(&workbook_xml, "workbookProtection")? else {
        return Ok(xlsx.to_vec());
    };
    let current = WorkbookProtection::from_attributes(&attrs)?;
    check_password(current.password_hash.as_ref(), password)?;

    let updated = replace_child_element(
        &workbook_xml,
        "workbookProtection",
        WORKBOOK_PROTECTION_FOLLOWERS,
        None,
    )?;
    log::debug!("removed workbook protection");
    package::rewrite_part(xlsx, WORKBOOK_PART, &updated)
}

/// Set `<sheetProtection>` on the worksheet named `sheet_name`.
pub fn protect_sheet(
    xlsx: &[u8],
    sheet_name: &str,
    protection: &SheetProtection,
) -> Result<Vec<u8>, ProtectionError> {
    let (part, sheet_xml) = read_sheet(xlsx, sheet_name)?;
    let attrs = protection.to_attributes();
    let updated = replace_child_element(
        &sheet_xml,
        "sheetProtection",
        SHEET_PROTECTION_FOLLOWERS,
        Some(attrs.as_slice()),
    )?;
    log::debug!("protecting sheet `{sheet_name}` ({part})");
    package::rewrite_part(xlsx, &part, &updated)
}

/// Remove `<sheetProtection>` from the worksheet named `sheet_name`.
///
/// When the element carries a password hash, `password` must match it.
pub fn unprotect_sheet(
    xlsx: &[u8],
    sheet_name: &str,
    password: &str,
) -> Result<Vec<u8>, ProtectionError> {
    let (part, sheet_xml) = read_sheet(xlsx, sheet_name)?;
    let Some(attrs) = child_element_attributes(&sheet_xml, "sheetProtection")? else {
        return Ok(xlsx.to_vec());
    };
    let current = SheetProtection::from_attributes(&attrs)?;
    check_password(current.password_hash.as_ref(), password)?;

    let updated =
        replace_child_element(&sheet_xml, "sheetProtection", SHEET_PROTECTION_FOLLOWERS, None)?;
    log::debug!("removed protection from sheet `{sheet_name}` ({part})");
    package::rewrite_part(xlsx, &part, &updated)
}

fn read_sheet(xlsx: &[u8], sheet_name: &str) -> Result<(String, Vec<u8>), ProtectionError> {
    let mut archive = package::open_archive(xlsx)?;
    let part = package::sheet_parts(&mut archive)?
        .into_iter()
        .find(|sheet| sheet.name == sheet_name)
        .map(|sheet| sheet.part)
        .ok_or_else(|| ProtectionError::SheetNotFound(sheet_name.to_string()))?;
    let xml = package::read_part(&mut archive, &part)?;
    Ok((part, xml))
}

fn check_password(hash: Option<&PasswordHash>, password: &str) -> Result<(), ProtectionError> {
    match hash {
        Some(hash) if !hash.verify(password)? => Err(ProtectionError::WrongPassword),
        _ => Ok(()),
    }
}
