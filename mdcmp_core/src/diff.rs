//! Structural comparison of two loaded configurations. Read-only and
//! deterministic: objects are paired by identity string (numeric IDs shift
//! between versions), backing streams are compared by checksum, and module
//! bodies are only descended into on a checksum mismatch.

use crate::checksum;
use crate::configuration::Configuration;
use crate::container::NodeId;
use crate::module_parser::{Module, Unit};
use crate::objects::Form;
use mdcmp_common::{DeveloperSignatures, DiffOptions, Report};
use std::collections::BTreeMap;

/// Processing identity holding the class registry instead of a module.
const CLASS_REGISTRY_IDENTITY: &str = "DefCls";

/// Compares two configurations and produces the ordered report: root
/// descriptor, global module, then each category in declaration order.
/// Neither configuration is modified.
pub fn compare(a: &Configuration, b: &Configuration, options: &DiffOptions) -> Report {
    let mut report = Report::new();

    if a.descriptor_checksum != b.descriptor_checksum {
        report.push(0, "Metadata structure changed");
    }

    if let Some((ga, gb)) = a.global_module.zip(b.global_module) {
        if a.tree.leaf_checksum(ga) != b.tree.leaf_checksum(gb) {
            report.push(0, "Global module");
            if options.diff_module_bodies {
                if let (Some(ma), Some(mb)) = (a.tree.leaf_module(ga), b.tree.leaf_module(gb)) {
                    compare_modules(&mut report, ma, mb, options);
                }
            }
        }
    }

    compare_catalogs(&mut report, a, b, options);
    compare_documents(&mut report, a, b, options);
    compare_journals(&mut report, a, b, options);
    compare_algorithms(&mut report, a, b, options);
    compare_calc_journals(&mut report, a, b, options);
    compare_processings(&mut report, a, b, options);
    compare_reports(&mut report, a, b, options);

    report
}

fn compare_catalogs(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.catalogs {
        let Some(other) = b.catalogs.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: Catalog.{}", item.identity));
            continue;
        };

        if let (Some(fa), Some(fb)) = (&item.form, &other.form) {
            let prefix = format!("Catalog.{}.ItemForm", item.identity);
            compare_form(report, a, b, &prefix, fa, fb, options);
        }
        if let (Some(fa), Some(fb)) = (&item.folder_form, &other.folder_form) {
            let prefix = format!("Catalog.{}.FolderForm", item.identity);
            compare_form(report, a, b, &prefix, fa, fb, options);
        }
        compare_form_lists(
            report,
            a,
            b,
            &format!("Catalog.{}.ListForm", item.identity),
            &item.list_forms,
            &other.list_forms,
            options,
        );
    }
    for other in &b.catalogs {
        if !a.catalogs.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: Catalog.{}", other.identity));
        }
    }
}

fn compare_documents(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.documents {
        let Some(other) = b.documents.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: Document.{}", item.identity));
            continue;
        };

        if let (Some(fa), Some(fb)) = (&item.form, &other.form) {
            let prefix = format!("Document.{}.Form", item.identity);
            compare_form(report, a, b, &prefix, fa, fb, options);
        }
        compare_module_leaf(
            report,
            a,
            b,
            &format!("Document.{}.TransactionModule", item.identity),
            item.transaction_module,
            other.transaction_module,
            options,
        );
    }
    for other in &b.documents {
        if !a.documents.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: Document.{}", other.identity));
        }
    }
}

fn compare_journals(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.journals {
        let Some(other) = b.journals.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: Journal.{}", item.identity));
            continue;
        };
        compare_form_lists(
            report,
            a,
            b,
            &format!("Journal.{}.ListForm", item.identity),
            &item.list_forms,
            &other.list_forms,
            options,
        );
    }
    for other in &b.journals {
        if !a.journals.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: Journal.{}", other.identity));
        }
    }
}

fn compare_algorithms(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.algorithms {
        let Some(other) = b.algorithms.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: CalculationAlgorithm.{}", item.identity));
            continue;
        };
        compare_module_leaf(
            report,
            a,
            b,
            &format!("CalculationAlgorithm.{}.CalculationModule", item.identity),
            item.calculation_module,
            other.calculation_module,
            options,
        );
    }
    for other in &b.algorithms {
        if !a.algorithms.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: CalculationAlgorithm.{}", other.identity));
        }
    }
}

fn compare_calc_journals(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.calc_journals {
        let Some(other) = b.calc_journals.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: CalcJournal.{}", item.identity));
            continue;
        };
        compare_form_lists(
            report,
            a,
            b,
            &format!("CalcJournal.{}.ListForm", item.identity),
            &item.list_forms,
            &other.list_forms,
            options,
        );
    }
    for other in &b.calc_journals {
        if !a.calc_journals.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: CalcJournal.{}", other.identity));
        }
    }
}

fn compare_processings(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.processings {
        let Some(other) = b.processings.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: Processing.{}", item.identity));
            continue;
        };
        let (Some(fa), Some(fb)) = (&item.form, &other.form) else {
            continue;
        };
        if item.identity == CLASS_REGISTRY_IDENTITY {
            compare_class_registry(report, a, b, &item.identity, fa, fb);
        } else {
            let prefix = format!("Processing.{}.Form", item.identity);
            compare_form(report, a, b, &prefix, fa, fb, options);
        }
    }
    for other in &b.processings {
        if !a.processings.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: Processing.{}", other.identity));
        }
    }
}

fn compare_reports(report: &mut Report, a: &Configuration, b: &Configuration, options: &DiffOptions) {
    for item in &a.reports {
        let Some(other) = b.reports.iter().find(|x| x.identity == item.identity) else {
            report.push(0, format!("Added: Report.{}", item.identity));
            continue;
        };
        if let (Some(fa), Some(fb)) = (&item.form, &other.form) {
            let prefix = format!("Report.{}.Form", item.identity);
            compare_form(report, a, b, &prefix, fa, fb, options);
        }
    }
    for other in &b.reports {
        if !a.reports.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed: Report.{}", other.identity));
        }
    }
}

fn compare_form_lists(
    report: &mut Report,
    a: &Configuration,
    b: &Configuration,
    prefix: &str,
    forms_a: &[Form],
    forms_b: &[Form],
    options: &DiffOptions,
) {
    for form in forms_a {
        match forms_b.iter().find(|x| x.identity == form.identity) {
            Some(other) => {
                let form_prefix = format!("{}.{}", prefix, form.identity);
                compare_form(report, a, b, &form_prefix, form, other, options);
            }
            None => report.push(0, format!("Added form: {}.{}", prefix, form.identity)),
        }
    }
    for other in forms_b {
        if !forms_a.iter().any(|x| x.identity == other.identity) {
            report.push(0, format!("Removed form: {}.{}", prefix, other.identity));
        }
    }
}

/// Compares one matched form pair: dialog module checksum, then (only under
/// a module mismatch, as the format's tooling does) the dialog layout, and
/// each worksheet matched by stream name. Absent backing streams are simply
/// omitted.
fn compare_form(
    report: &mut Report,
    a: &Configuration,
    b: &Configuration,
    prefix: &str,
    form_a: &Form,
    form_b: &Form,
    options: &DiffOptions,
) {
    if let Some((ma, mb)) = form_a.dialog_module.zip(form_b.dialog_module) {
        if a.tree.leaf_checksum(ma) != b.tree.leaf_checksum(mb) {
            report.push(0, format!("{}.Module", prefix));
            if options.diff_module_bodies {
                if let (Some(module_a), Some(module_b)) =
                    (a.tree.leaf_module(ma), b.tree.leaf_module(mb))
                {
                    compare_modules(report, module_a, module_b, options);
                }
            }
            if let Some((da, db)) = form_a.dialog.zip(form_b.dialog) {
                if a.tree.leaf_checksum(da) != b.tree.leaf_checksum(db) {
                    report.push(0, format!("{}.Dialog", prefix));
                }
            }
        }
    }

    for worksheet_id in &form_a.worksheets {
        let worksheet = a.tree.node(*worksheet_id);
        let pair = form_b
            .worksheets
            .iter()
            .map(|id| b.tree.node(*id))
            .find(|node| node.name == worksheet.name);
        match pair {
            Some(other) => {
                let checksum_a = worksheet.leaf().map(|c| c.checksum).unwrap_or(0);
                let checksum_b = other.leaf().map(|c| c.checksum).unwrap_or(0);
                if checksum_a != checksum_b {
                    report.push(0, format!("Worksheet {}.{}", prefix, worksheet.description));
                }
            }
            None => report.push(
                0,
                format!("Added worksheet {}.{}", prefix, worksheet.description),
            ),
        }
    }
}

fn compare_module_leaf(
    report: &mut Report,
    a: &Configuration,
    b: &Configuration,
    label: &str,
    leaf_a: Option<NodeId>,
    leaf_b: Option<NodeId>,
    options: &DiffOptions,
) {
    let Some((ia, ib)) = leaf_a.zip(leaf_b) else {
        return;
    };
    if a.tree.leaf_checksum(ia) != b.tree.leaf_checksum(ib) {
        report.push(0, label.to_string());
        if options.diff_module_bodies {
            if let (Some(ma), Some(mb)) = (a.tree.leaf_module(ia), b.tree.leaf_module(ib)) {
                compare_modules(report, ma, mb, options);
            }
        }
    }
}

/// Unit-level module diff: global blocks, then each unit by body checksum
/// with parameter set-differences in both directions.
pub(crate) fn compare_modules(
    report: &mut Report,
    a: &Module,
    b: &Module,
    options: &DiffOptions,
) {
    match (&a.global_vars, &b.global_vars) {
        (Some(va), Some(vb)) => {
            if checksum::text_checksum(va) != checksum::text_checksum(vb) {
                report.push(3, "Global variables block");
            }
        }
        (Some(_), None) => report.push(3, "Added global variables block"),
        (None, Some(_)) => report.push(3, "Removed global variables block"),
        (None, None) => {}
    }

    match (&a.global_context, &b.global_context) {
        (Some(ca), Some(cb)) => {
            if checksum::text_checksum(ca) != checksum::text_checksum(cb) {
                report.push(3, "Code outside units");
            }
        }
        (Some(_), None) => report.push(3, "Added code outside units"),
        (None, Some(_)) => report.push(3, "Removed code outside units"),
        (None, None) => {}
    }

    for (name, unit) in &a.units {
        match b.units.get(name) {
            Some(other) => {
                if checksum::text_checksum(&unit.body) != checksum::text_checksum(&other.body) {
                    report.push(4, format!("{}()", name));
                    for parameter in &unit.parameters {
                        if !other.parameters.contains(parameter) {
                            report.push(7, format!("Added parameter \"{}\"", parameter));
                        }
                    }
                    for parameter in &other.parameters {
                        if !unit.parameters.contains(parameter) {
                            report.push(7, format!("Removed parameter \"{}\"", parameter));
                        }
                    }
                    if options.attribute_authors {
                        let authors = change_authors(unit, other, &options.signatures);
                        if !authors.is_empty() {
                            report.push(8, format!("Change authors: {}", authors.join(",")));
                        }
                    }
                }
            }
            None => {
                report.push(4, format!("Added {}()", name));
                if options.attribute_authors {
                    let authors: Vec<String> =
                        marker_counts(unit, &options.signatures).into_keys().collect();
                    if !authors.is_empty() {
                        report.push(8, format!("Change authors: {}", authors.join(",")));
                    }
                }
            }
        }
    }
    for name in b.units.keys() {
        if !a.units.contains_key(name) {
            report.push(4, format!("Removed {}()", name));
        }
    }
}

/// Occurrences of each signature marker in the unit's text, keyed by
/// developer name.
fn marker_counts(unit: &Unit, signatures: &DeveloperSignatures) -> BTreeMap<String, usize> {
    let text = format!("{}\r\n{}", unit.pre_comment, unit.body);
    let mut counts = BTreeMap::new();
    for (marker, developer) in signatures {
        let occurrences = text.matches(marker.as_str()).count();
        if occurrences > 0 {
            *counts.entry(developer.clone()).or_insert(0) += occurrences;
        }
    }
    counts
}

/// A developer whose marker count on the `a` side strictly exceeds the `b`
/// side, or who appears on only one side, is attributed as a change author.
fn change_authors(unit_a: &Unit, unit_b: &Unit, signatures: &DeveloperSignatures) -> Vec<String> {
    let counts_a = marker_counts(unit_a, signatures);
    let counts_b = marker_counts(unit_b, signatures);

    let mut authors = Vec::new();
    for (developer, count) in &counts_a {
        match counts_b.get(developer) {
            Some(other) => {
                if count > other {
                    authors.push(developer.clone());
                }
            }
            None => authors.push(developer.clone()),
        }
    }
    for developer in counts_b.keys() {
        if !counts_a.contains_key(developer) {
            authors.push(developer.clone());
        }
    }
    authors
}

/// The class-registry processing is a line-oriented table, not a module:
/// `ClassName = Processing@...` per line. Report classes present on only one
/// side.
fn compare_class_registry(
    report: &mut Report,
    a: &Configuration,
    b: &Configuration,
    identity: &str,
    form_a: &Form,
    form_b: &Form,
) {
    let Some((ma, mb)) = form_a.dialog_module.zip(form_b.dialog_module) else {
        return;
    };
    if a.tree.leaf_checksum(ma) == b.tree.leaf_checksum(mb) {
        return;
    }

    let text_a = registry_text(a, ma);
    let text_b = registry_text(b, mb);
    let mut changes: Vec<String> = Vec::new();

    for line in registry_lines(text_a) {
        let Some((class_name, processing)) = parse_registry_line(line) else {
            continue;
        };
        if !text_b.contains(class_name) {
            changes.push(format!(
                "Added class {} (processing \"{}\")",
                class_name, processing
            ));
        }
    }
    for line in registry_lines(text_b) {
        let Some((class_name, _)) = parse_registry_line(line) else {
            continue;
        };
        if !text_a.contains(class_name) {
            changes.push(format!("Removed class {}", class_name));
        }
    }

    if !changes.is_empty() {
        report.push(0, format!("{}:", identity));
        for change in changes {
            report.push(4, change);
        }
    }
}

fn registry_text(config: &Configuration, id: NodeId) -> &str {
    config
        .tree
        .node(id)
        .leaf()
        .and_then(|content| content.text.as_deref())
        .unwrap_or("")
}

fn registry_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split("\r\n")
        .filter(|line| !line.is_empty() && !line.starts_with("//# {"))
}

fn parse_registry_line(line: &str) -> Option<(&str, &str)> {
    let eq = line.find('=')?;
    let class_name = line[..eq].trim_matches(' ').rsplit(' ').next()?;
    if class_name.is_empty() {
        return None;
    }
    let processing = line[eq + 1..]
        .split('@')
        .next()
        .unwrap_or("")
        .trim_matches(' ');
    Some((class_name, processing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_parser::parse_module;

    fn options_with_bodies() -> DiffOptions {
        DiffOptions {
            diff_module_bodies: true,
            ..Default::default()
        }
    }

    const BASE: &str = "\r\nПроцедура Расчет(Сумма)\r\n    Итог = Сумма;\r\nКонецПроцедуры\r\n";
    const WITH_PARAM: &str =
        "\r\nПроцедура Расчет(Сумма, Ставка)\r\n    Итог = Сумма * Ставка;\r\nКонецПроцедуры\r\n";

    #[test]
    fn identical_modules_produce_nothing() {
        let a = parse_module(BASE);
        let b = parse_module(BASE);
        let mut report = Report::new();
        compare_modules(&mut report, &a, &b, &options_with_bodies());
        assert!(report.is_empty());
    }

    #[test]
    fn changed_body_with_added_parameter() {
        let a = parse_module(WITH_PARAM);
        let b = parse_module(BASE);
        let mut report = Report::new();
        compare_modules(&mut report, &a, &b, &options_with_bodies());

        let texts: Vec<&str> = report.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Процедура Расчет()", "Added parameter \"Ставка\""]
        );
        assert_eq!(report.lines[0].indent, 4);
        assert_eq!(report.lines[1].indent, 7);
    }

    #[test]
    fn removed_parameter_reports_other_direction() {
        let a = parse_module(BASE);
        let b = parse_module(WITH_PARAM);
        let mut report = Report::new();
        compare_modules(&mut report, &a, &b, &options_with_bodies());

        assert!(report
            .lines
            .iter()
            .any(|l| l.text == "Removed parameter \"Ставка\""));
    }

    #[test]
    fn one_sided_units_report_added_and_removed() {
        let a = parse_module(
            "\r\nПроцедура Старая()\r\nКонецПроцедуры\r\nПроцедура Общая()\r\nКонецПроцедуры\r\n",
        );
        let b = parse_module(
            "\r\nПроцедура Новая()\r\nКонецПроцедуры\r\nПроцедура Общая()\r\nКонецПроцедуры\r\n",
        );
        let mut report = Report::new();
        compare_modules(&mut report, &a, &b, &options_with_bodies());

        let texts: Vec<&str> = report.lines.iter().map(|l| l.text.as_str()).collect();
        assert!(texts.contains(&"Added Процедура Старая()"));
        assert!(texts.contains(&"Removed Процедура Новая()"));
        assert!(!texts.iter().any(|t| t.contains("Общая")));
    }

    #[test]
    fn global_blocks_compared_by_presence_and_hash() {
        let a = parse_module("Перем А;\r\nПроцедура П()\r\nКонецПроцедуры\r\n");
        let b = parse_module("\r\nПроцедура П()\r\nКонецПроцедуры\r\n");
        let mut report = Report::new();
        compare_modules(&mut report, &a, &b, &options_with_bodies());

        assert!(report
            .lines
            .iter()
            .any(|l| l.text == "Added global variables block"));
    }

    #[test]
    fn authorship_attributed_to_strictly_larger_count() {
        let mut signatures = DeveloperSignatures::new();
        signatures.insert("//AB".to_string(), "A. Borisov".to_string());
        signatures.insert("//NK".to_string(), "N. Kuznetsova".to_string());

        let a = parse_module(
            "\r\nПроцедура Расчет()\r\n    Итог = 2; //AB\r\n    Шаг = 3; //AB\r\n    Кэш = 4; //NK\r\nКонецПроцедуры\r\n",
        );
        let b = parse_module(
            "\r\nПроцедура Расчет()\r\n    Итог = 1; //AB\r\n    Кэш = 4; //NK\r\nКонецПроцедуры\r\n",
        );

        let unit_a = &a.units["Процедура Расчет"];
        let unit_b = &b.units["Процедура Расчет"];
        let authors = change_authors(unit_a, unit_b, &signatures);

        // A. Borisov has two markers against one; N. Kuznetsova is tied
        assert_eq!(authors, vec!["A. Borisov"]);
    }

    #[test]
    fn authorship_includes_one_sided_markers() {
        let mut signatures = DeveloperSignatures::new();
        signatures.insert("//XX".to_string(), "X".to_string());

        let a = parse_module("\r\nПроцедура Р()\r\n    А=1;\r\nКонецПроцедуры\r\n");
        let b = parse_module("\r\nПроцедура Р()\r\n    А=2; //XX\r\nКонецПроцедуры\r\n");

        let authors = change_authors(&a.units["Процедура Р"], &b.units["Процедура Р"], &signatures);
        assert_eq!(authors, vec!["X"]);
    }

    #[test]
    fn registry_line_parsing() {
        let (class, processing) = parse_registry_line("  КлассА = ОбрА@433").unwrap();
        assert_eq!(class, "КлассА");
        assert_eq!(processing, "ОбрА");
        assert!(parse_registry_line("no equals here").is_none());
    }
}
