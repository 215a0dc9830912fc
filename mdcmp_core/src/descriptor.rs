//! Parser for the root descriptor stream: a nested-bracket notation in which
//! bracket-nesting depth carries the meaning. Depth 3 holds category tags,
//! depth 4 the objects of the active category, depths 5-8 sub-records of the
//! active object. The scan splits on braces and tracks depth arithmetically;
//! it is not a recursive-descent parser, and field order within a record is
//! the parsing contract.
//!
//! The container tree must be fully built before this parser runs: every
//! object's backing form or module is resolved by a category-specific path
//! template keyed by the object's numeric ID. A missing lookup leaves the
//! optional reference unset. A record with missing or unparsable fields is
//! skipped with a warning, never guessed at.

use crate::container::ContainerTree;
use crate::objects::{
    AccountingParameters, AttributeRecord, CalcJournal, CalculationAlgorithm, Catalog, Document,
    Form, Journal, Processing, ReportItem,
};
use mdcmp_common::Warning;
use tracing::debug;

/// Category tags of the descriptor stream, matched after stripping quotes
/// and spaces (`Document Streams` → `DocumentStreams`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    MainDataContDef,
    TaskItem,
    GenJrnlFldDef,
    DocSelRefObj,
    DocNumDef,
    Registers,
    Documents,
    Journalisters,
    EnumList,
    ReportList,
    CJ,
    Calendars,
    Algorithms,
    RecalcRules,
    CalcVars,
    Groups,
    DocumentStreams,
    Buh,
    Crc,
    Refers,
    Consts,
    SbCnts,
    Params,
    Form,
}

impl Category {
    pub fn from_tag(tag: &str) -> Option<Self> {
        use Category::*;
        Some(match tag {
            "MainDataContDef" => MainDataContDef,
            "TaskItem" => TaskItem,
            "GenJrnlFldDef" => GenJrnlFldDef,
            "DocSelRefObj" => DocSelRefObj,
            "DocNumDef" => DocNumDef,
            "Registers" => Registers,
            "Documents" => Documents,
            "Journalisters" => Journalisters,
            "EnumList" => EnumList,
            "ReportList" => ReportList,
            "CJ" => CJ,
            "Calendars" => Calendars,
            "Algorithms" => Algorithms,
            "RecalcRules" => RecalcRules,
            "CalcVars" => CalcVars,
            "Groups" => Groups,
            "DocumentStreams" => DocumentStreams,
            "Buh" => Buh,
            "CRC" => Crc,
            "Refers" => Refers,
            "Consts" => Consts,
            "SbCnts" => SbCnts,
            "Params" => Params,
            "Form" => Form,
            _ => return None,
        })
    }
}

/// Logical objects recovered from one descriptor stream.
#[derive(Debug, Default)]
pub struct DescriptorObjects {
    pub catalogs: Vec<Catalog>,
    pub documents: Vec<Document>,
    pub journals: Vec<Journal>,
    pub calc_journals: Vec<CalcJournal>,
    pub reports: Vec<ReportItem>,
    pub processings: Vec<Processing>,
    pub algorithms: Vec<CalculationAlgorithm>,
    pub accounting: Option<AccountingParameters>,
    pub unknown_categories: Vec<String>,
    pub warnings: Vec<Warning>,
}

enum Active {
    None,
    Catalog(usize),
    Document(usize),
    Journal(usize),
    CalcJournal(usize),
}

fn parse_int(field: &str) -> Option<i32> {
    field.trim().parse().ok()
}

fn field_skip(result: &mut DescriptorObjects, what: &str, fields: &[String]) {
    debug!("skipping {} record with {} fields", what, fields.len());
    result.warnings.push(Warning::StructureMismatch {
        path: "descriptor stream".to_string(),
        detail: format!("{} record skipped: bad field layout ({} fields)", what, fields.len()),
    });
}

impl Catalog {
    fn from_fields(fields: &[String]) -> Option<Catalog> {
        if fields.len() < 18 {
            return None;
        }
        Some(Catalog {
            id: parse_int(&fields[0])?,
            identity: fields[1].clone(),
            description: fields[2].clone(),
            alias: fields[3].clone(),
            parent: parse_int(&fields[4])?,
            code_length: parse_int(&fields[5])?,
            code_series: parse_int(&fields[6])?,
            code_type: parse_int(&fields[7])?,
            auto_numbering: parse_int(&fields[8])?,
            name_length: parse_int(&fields[9])?,
            main_representation: parse_int(&fields[10])?,
            edit_mode: parse_int(&fields[11])?,
            level_count: parse_int(&fields[12])?,
            select_form_id: parse_int(&fields[13])?,
            main_form_id: parse_int(&fields[14])?,
            one_form: parse_int(&fields[15])?,
            unique_codes: parse_int(&fields[16])?,
            // the last field tolerates a trailing comma
            groups_on_top: parse_int(&fields[17].replace(',', ""))?,
            ..Default::default()
        })
    }
}

/// Parses the decoded root descriptor stream against an already-built
/// container tree.
pub fn parse_descriptor(text: &str, tree: &ContainerTree) -> DescriptorObjects {
    let mut result = DescriptorObjects::default();

    let Some(start) = text.find("{\r\n") else {
        result.warnings.push(Warning::StructureMismatch {
            path: "descriptor stream".to_string(),
            detail: "no opening bracket group found".to_string(),
        });
        return result;
    };
    let flat = text[start..].replace("\r\n", "");

    let mut level: i64 = 0;
    let mut category: Option<Category> = None;
    let mut active = Active::None;
    let mut sub_tag = String::new();
    let mut buh_forms = 0usize;

    for element in flat.split('{') {
        level += 1;
        let pieces: Vec<&str> = element.split('}').collect();

        for piece in &pieces {
            let first_field = piece.split(',').next().unwrap_or("");
            let tag = first_field.replace('"', "").replace(' ', "");

            if level == 3 && !tag.is_empty() {
                match Category::from_tag(&tag) {
                    Some(found) => category = Some(found),
                    None => result.unknown_categories.push(tag.clone()),
                }
            }

            let fields: Vec<String> = piece
                .replace("\",\"", "|")
                .replace('"', "")
                .split('|')
                .map(str::to_string)
                .collect();

            if level == 4 && fields.len() >= 4 {
                parse_object(&mut result, &mut active, tree, category, &fields);
            }

            if level == 5 || level == 7 {
                sub_tag = tag.clone();
                if category == Some(Category::Buh) && tag == "Form" {
                    buh_forms += 1;
                }
            }

            if (level == 6 || level == 8) && sub_tag == "Form" && fields.len() == 4 {
                parse_sub_form(&mut result, &active, tree, category, buh_forms, &fields);
            }

            if level == 6 && sub_tag == "Params" && fields.len() >= 4 {
                parse_attribute(&mut result, &active, &fields);
            }
        }

        level -= pieces.len() as i64 - 1;
    }

    result
}

fn parse_object(
    result: &mut DescriptorObjects,
    active: &mut Active,
    tree: &ContainerTree,
    category: Option<Category>,
    fields: &[String],
) {
    match category {
        Some(Category::SbCnts) => match Catalog::from_fields(fields) {
            Some(mut catalog) => {
                // edit mode 0 means in-list editing, without an item form
                if catalog.edit_mode != 0 {
                    if let Some(container) = tree.get_container(&format!(
                        "Root\\Subconto\\Subconto_Number{}\\WorkBook",
                        catalog.id
                    )) {
                        catalog.form = Some(Form::from_container(tree, container));
                    }
                }
                if catalog.one_form != 1 && catalog.level_count > 1 {
                    if let Some(container) = tree.get_container(&format!(
                        "Root\\SubFolder\\SubFolder_Number{}\\WorkBook",
                        catalog.id
                    )) {
                        catalog.folder_form = Some(Form::from_container(tree, container));
                    }
                }
                *active = Active::Catalog(result.catalogs.len());
                result.catalogs.push(catalog);
            }
            None => field_skip(result, "catalog", fields),
        },

        Some(Category::Documents) => match parse_int(&fields[0]) {
            Some(id) => {
                let mut document = Document {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    ..Default::default()
                };
                if let Some(container) = tree
                    .get_container(&format!("Root\\Document\\Document_Number{}\\WorkBook", id))
                {
                    document.form = Some(Form::from_container(tree, container));
                }
                document.transaction_module = tree.get_leaf_id(&format!(
                    "Root\\TypedText\\Transact_Number{}\\MD Programm text",
                    id
                ));
                *active = Active::Document(result.documents.len());
                result.documents.push(document);
            }
            None => field_skip(result, "document", fields),
        },

        Some(Category::Journalisters) => match parse_int(&fields[0]) {
            Some(id) => {
                *active = Active::Journal(result.journals.len());
                result.journals.push(Journal {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    ..Default::default()
                });
            }
            None => field_skip(result, "journal", fields),
        },

        Some(Category::CJ) => match parse_int(&fields[0]) {
            Some(id) => {
                *active = Active::CalcJournal(result.calc_journals.len());
                result.calc_journals.push(CalcJournal {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    ..Default::default()
                });
            }
            None => field_skip(result, "calc journal", fields),
        },

        Some(Category::ReportList) => match parse_int(&fields[0]) {
            Some(id) => {
                let form = tree
                    .get_container(&format!("Root\\Report\\Report_Number{}\\WorkBook", id))
                    .map(|container| Form::from_container(tree, container));
                result.reports.push(ReportItem {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    form,
                });
                *active = Active::None;
            }
            None => field_skip(result, "report", fields),
        },

        Some(Category::CalcVars) => match parse_int(&fields[0]) {
            Some(id) => {
                let form = tree
                    .get_container(&format!("Root\\CalcVar\\CalcVar_Number{}\\WorkBook", id))
                    .map(|container| Form::from_container(tree, container));
                result.processings.push(Processing {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    form,
                });
                *active = Active::None;
            }
            None => field_skip(result, "processing", fields),
        },

        Some(Category::Algorithms) => match parse_int(&fields[0]) {
            Some(id) => {
                let calculation_module = tree.get_leaf_id(&format!(
                    "Root\\TypedText\\CalcAlg_Number{}\\MD Programm text",
                    id
                ));
                result.algorithms.push(CalculationAlgorithm {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    calculation_module,
                });
                *active = Active::None;
            }
            None => field_skip(result, "calculation algorithm", fields),
        },

        Some(Category::Buh) => match parse_int(&fields[0]) {
            Some(id) => {
                let mut accounting = AccountingParameters {
                    id,
                    identity: fields[1].clone(),
                    alias: fields[2].clone(),
                    ..Default::default()
                };
                // the operation document's form lives under the accounting
                // parameters' numeric ID
                if let Some(document) = result
                    .documents
                    .iter_mut()
                    .find(|d| d.identity == "Операция")
                {
                    if let Some(container) = tree.get_container(&format!(
                        "Root\\Operation\\Operation_Number{}\\WorkBook",
                        fields[0]
                    )) {
                        document.form = Some(Form::from_container(tree, container));
                    }
                }
                if let Some(container) = tree.get_container(&format!(
                    "Root\\AccountChart\\AccountChart_Number{}\\WorkBook",
                    id
                )) {
                    accounting.account_chart.push(Form::from_container(tree, container));
                }
                result.accounting = Some(accounting);
                *active = Active::None;
            }
            None => field_skip(result, "accounting parameters", fields),
        },

        _ => {}
    }
}

fn parse_sub_form(
    result: &mut DescriptorObjects,
    active: &Active,
    tree: &ContainerTree,
    category: Option<Category>,
    buh_forms: usize,
    fields: &[String],
) {
    let Some(id) = parse_int(&fields[0]) else {
        field_skip(result, "form", fields);
        return;
    };

    let container = match category {
        Some(Category::SbCnts) => tree.get_container(&format!(
            "Root\\SubList\\SubList_Number{}\\WorkBook",
            fields[0]
        )),
        Some(Category::Journalisters) => tree.get_container(&format!(
            "Root\\Journal\\Journal_Number{}\\WorkBook",
            fields[0]
        )),
        Some(Category::CJ) => tree.get_container(&format!(
            "Root\\CalcJournal\\CalcJournal_Number{}\\WorkBook",
            fields[0]
        )),
        Some(Category::Buh) => match buh_forms {
            // account-chart-list, account-chart, transaction-list and
            // operation-list forms, by encounter order; the second block has
            // no backing container
            1 => tree.get_container(&format!(
                "Root\\AccountChartList\\AccountChartList_Number{}\\WorkBook",
                fields[0]
            )),
            3 => tree.get_container(&format!(
                "Root\\ProvList\\ProvList_Number{}\\WorkBook",
                fields[0]
            )),
            4 => tree.get_container(&format!(
                "Root\\OperationList\\OperationList_Number{}\\WorkBook",
                fields[0]
            )),
            _ => None,
        },
        _ => None,
    };

    let mut form = container
        .map(|c| Form::from_container(tree, c))
        .unwrap_or_default();
    form.id = id;
    form.identity = fields[1].clone();
    form.alias = fields[2].clone();
    form.description = fields[3].clone();

    match (category, active) {
        (Some(Category::SbCnts), Active::Catalog(index)) => {
            result.catalogs[*index].list_forms.push(form);
        }
        (Some(Category::Journalisters), Active::Journal(index)) => {
            result.journals[*index].list_forms.push(form);
        }
        (Some(Category::CJ), Active::CalcJournal(index)) => {
            result.calc_journals[*index].list_forms.push(form);
        }
        (Some(Category::Buh), _) => {
            if let Some(accounting) = &mut result.accounting {
                match buh_forms {
                    1 => accounting.account_chart_list.push(form),
                    2 => accounting.account_chart.push(form),
                    3 => accounting.transaction_list.push(form),
                    4 => accounting.operation_list.push(form),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn parse_attribute(result: &mut DescriptorObjects, active: &Active, fields: &[String]) {
    let Some(id) = parse_int(&fields[0]) else {
        return;
    };
    let attribute = AttributeRecord {
        id,
        identity: fields[1].clone(),
        alias: fields[2].clone(),
        description: fields[3].clone(),
    };
    match active {
        Active::Catalog(index) => result.catalogs[*index].attributes.push(attribute),
        Active::Document(index) => result.documents[*index].attributes.push(attribute),
        Active::Journal(index) => result.journals[*index].attributes.push(attribute),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerTree;

    // a tree with no nodes besides the root: every backing lookup misses,
    // which must leave the optional references unset, never fail
    fn bare_tree() -> ContainerTree {
        ContainerTree::empty()
    }

    fn mms(body: &str) -> String {
        format!("junk header{{\r\n{}", body)
    }

    #[test]
    fn category_tags() {
        assert_eq!(Category::from_tag("SbCnts"), Some(Category::SbCnts));
        assert_eq!(
            Category::from_tag("DocumentStreams"),
            Some(Category::DocumentStreams)
        );
        assert_eq!(Category::from_tag("CRC"), Some(Category::Crc));
        assert_eq!(Category::from_tag("Bogus"), None);
    }

    #[test]
    fn parses_catalog_record() {
        let tree = bare_tree();
        let text = mms(
            "{\"SbCnts\",\"1\",\r\n{\"5\",\"Товары\",\"Справочник товаров\",\"тов\",\"0\",\"5\",\"1\",\"1\",\"2\",\"25\",\"1\",\"1\",\"1\",\"0\",\"0\",\"0\",\"1\",\"0\"}}",
        );
        let objects = parse_descriptor(&text, &tree);

        assert_eq!(objects.catalogs.len(), 1);
        let catalog = &objects.catalogs[0];
        assert_eq!(catalog.id, 5);
        assert_eq!(catalog.identity, "Товары");
        assert_eq!(catalog.description, "Справочник товаров");
        assert_eq!(catalog.alias, "тов");
        assert_eq!(catalog.code_length, 5);
        assert_eq!(catalog.name_length, 25);
        assert_eq!(catalog.edit_mode, 1);
        // lookups against an empty tree leave references unset
        assert!(catalog.form.is_none());
        assert!(catalog.folder_form.is_none());
    }

    #[test]
    fn unknown_category_is_accumulated() {
        let tree = bare_tree();
        let text = mms("{\"FutureThing\",\"1\"},{\"Documents\",\"0\",\r\n{\"7\",\"Счет\",\"сч\",\"x\"}}");
        let objects = parse_descriptor(&text, &tree);

        assert_eq!(objects.unknown_categories, vec!["FutureThing"]);
        assert_eq!(objects.documents.len(), 1);
        assert_eq!(objects.documents[0].identity, "Счет");
    }

    #[test]
    fn short_catalog_record_is_skipped() {
        let tree = bare_tree();
        let text = mms("{\"SbCnts\",\"1\",\r\n{\"5\",\"Товары\",\"опис\",\"тов\"}}");
        let objects = parse_descriptor(&text, &tree);

        assert!(objects.catalogs.is_empty());
        assert_eq!(objects.warnings.len(), 1);
    }

    #[test]
    fn unparsable_id_is_skipped() {
        let tree = bare_tree();
        let text = mms("{\"Documents\",\"1\",\r\n{\"семь\",\"Счет\",\"сч\",\"x\"}}");
        let objects = parse_descriptor(&text, &tree);

        assert!(objects.documents.is_empty());
        assert_eq!(objects.warnings.len(), 1);
    }

    #[test]
    fn nested_list_form_lands_on_active_object() {
        let tree = bare_tree();
        let text = mms(
            "{\"Journalisters\",\"1\",\r\n{\"3\",\"Общий\",\"жур\",\"x\",\r\n{\"Form\",\r\n{\"9\",\"ФормаСписка\",\"фс\",\"основная\"}}}}",
        );
        let objects = parse_descriptor(&text, &tree);

        assert_eq!(objects.journals.len(), 1);
        let journal = &objects.journals[0];
        assert_eq!(journal.list_forms.len(), 1);
        assert_eq!(journal.list_forms[0].id, 9);
        assert_eq!(journal.list_forms[0].identity, "ФормаСписка");
        assert_eq!(journal.list_forms[0].description, "основная");
    }

    #[test]
    fn accounting_forms_select_by_encounter_order() {
        let tree = bare_tree();
        let text = mms(
            "{\"Buh\",\"1\",\r\n{\"2\",\"Основная\",\"бух\",\"x\",\r\n\
             {\"Form\",\r\n{\"11\",\"СписокПС\",\"а\",\"б\"}},\r\n\
             {\"Form\",\r\n{\"12\",\"ПланСчетов\",\"а\",\"б\"}},\r\n\
             {\"Form\",\r\n{\"13\",\"СписокПроводок\",\"а\",\"б\"}},\r\n\
             {\"Form\",\r\n{\"14\",\"СписокОпераций\",\"а\",\"б\"}}}}",
        );
        let objects = parse_descriptor(&text, &tree);

        let accounting = objects.accounting.expect("accounting parameters");
        assert_eq!(accounting.account_chart_list.len(), 1);
        assert_eq!(accounting.account_chart_list[0].identity, "СписокПС");
        assert_eq!(accounting.account_chart.len(), 1);
        assert_eq!(accounting.account_chart[0].identity, "ПланСчетов");
        assert_eq!(accounting.transaction_list[0].identity, "СписокПроводок");
        assert_eq!(accounting.operation_list[0].identity, "СписокОпераций");
    }

    #[test]
    fn attributes_attach_to_active_object() {
        let tree = bare_tree();
        let text = mms(
            "{\"Documents\",\"1\",\r\n{\"7\",\"Счет\",\"сч\",\"x\",\r\n{\"Params\",\r\n{\"21\",\"Сумма\",\"сум\",\"число\"}}}}",
        );
        let objects = parse_descriptor(&text, &tree);

        assert_eq!(objects.documents.len(), 1);
        let attributes = &objects.documents[0].attributes;
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].identity, "Сумма");
    }

    #[test]
    fn no_bracket_group_is_recoverable() {
        let tree = bare_tree();
        let objects = parse_descriptor("plain text", &tree);
        assert!(objects.catalogs.is_empty());
        assert_eq!(objects.warnings.len(), 1);
    }
}
