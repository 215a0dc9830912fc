//! End-to-end tests over real compound-container fixtures: build two
//! configuration files, load them, and compare.

use flate2::write::DeflateEncoder;
use flate2::Compression;
use mdcmp_common::{DiffOptions, MdCmpError, Warning};
use mdcmp_core::{compare, Configuration};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;

fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn cp1251(text: &str) -> Vec<u8> {
    encoding_rs::WINDOWS_1251.encode(text).0.into_owned()
}

fn manifest(entries: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut text = String::from("{\"Container.Contents\"");
    for (role, name, description) in entries {
        text.push_str(&format!(",{{\"{}\",\"{}\",\"{}\"}}", role, name, description));
    }
    text.push('}');
    cp1251(&text)
}

fn write_stream(comp: &mut cfb::CompoundFile<File>, path: &str, bytes: &[u8]) {
    let mut stream = comp.create_stream(path).unwrap();
    stream.write_all(bytes).unwrap();
}

const CATALOG_RECORD: &str = "{\"5\",\"Tovary\",\"descr\",\"tov\",\"0\",\"5\",\"1\",\"1\",\"2\",\"25\",\"1\",\"1\",\"1\",\"0\",\"0\",\"0\",\"1\",\"0\"}";

fn mms_catalogs_only() -> String {
    format!("Config{{\r\n{{\"SbCnts\",\"1\",\r\n{}}}\r\n}}", CATALOG_RECORD)
}

fn mms_with_document() -> String {
    format!(
        "Config{{\r\n{{\"SbCnts\",\"1\",\r\n{}}},{{\"Documents\",\"1\",\r\n{{\"7\",\"Schet\",\"s\",\"x\"}}}}\r\n}}",
        CATALOG_RECORD
    )
}

struct Fixture {
    mms_body: String,
    global_module: String,
    form_module: String,
    worksheet: Vec<u8>,
}

impl Default for Fixture {
    fn default() -> Self {
        Fixture {
            mms_body: mms_catalogs_only(),
            global_module:
                "\r\nПроцедура Общая()\r\n    Итог = 0;\r\nКонецПроцедуры\r\n".to_string(),
            form_module: FORM_MODULE_BASE.to_string(),
            worksheet: vec![0x4D, 0x6F, 0x78, 0x01, 0x02],
        }
    }
}

const FORM_MODULE_BASE: &str =
    "\r\nПроцедура Расчет(Сумма)\r\n    Итог = Сумма;\r\nКонецПроцедуры\r\n";
const FORM_MODULE_WITH_PARAM: &str =
    "\r\nПроцедура Расчет(Сумма, Ставка)\r\n    Итог = Сумма * Ставка;\r\nКонецПроцедуры\r\n";

fn write_config(path: &Path, fixture: &Fixture) {
    let mut comp = cfb::create(path).unwrap();

    write_stream(
        &mut comp,
        "/Container.Contents",
        &manifest(&[
            ("MetaDataContainer", "Metadata", "md"),
            ("TypedTextContainer", "TypedText", "tt"),
            ("SubcontoContainer", "Subconto", "sc"),
        ]),
    );

    comp.create_storage("/Metadata").unwrap();
    write_stream(
        &mut comp,
        "/Metadata/Container.Contents",
        &manifest(&[
            ("MetaDataStream", "Main MetaData Stream", "mms"),
            ("TagStream", "TagStream", "tags"),
            ("GuidHistoryContainer", "GUIDData", "guids"),
        ]),
    );
    let mut mms = vec![0xFF];
    mms.extend(cp1251(&fixture.mms_body));
    write_stream(&mut comp, "/Metadata/Main MetaData Stream", &mms);
    write_stream(&mut comp, "/Metadata/TagStream", &[0x01, 0x02, 0x03]);
    let mut guids = vec![0u8; 20];
    guids.extend([7u8; 16]);
    write_stream(&mut comp, "/Metadata/GUIDData", &guids);

    comp.create_storage("/TypedText").unwrap();
    write_stream(
        &mut comp,
        "/TypedText/Container.Contents",
        &manifest(&[("ModuleContainer", "ModuleText_Number1", "m1")]),
    );
    comp.create_storage("/TypedText/ModuleText_Number1").unwrap();
    write_stream(
        &mut comp,
        "/TypedText/ModuleText_Number1/Container.Contents",
        &manifest(&[("TextDocument", "MD Programm text", "global module")]),
    );
    write_stream(
        &mut comp,
        "/TypedText/ModuleText_Number1/MD Programm text",
        &deflate(&cp1251(&fixture.global_module)),
    );

    comp.create_storage("/Subconto").unwrap();
    write_stream(
        &mut comp,
        "/Subconto/Container.Contents",
        &manifest(&[("SubcontoContainer", "Subconto_Number5", "s5")]),
    );
    comp.create_storage("/Subconto/Subconto_Number5").unwrap();
    write_stream(
        &mut comp,
        "/Subconto/Subconto_Number5/Container.Contents",
        &manifest(&[("WorkBookContainer", "WorkBook", "wb")]),
    );
    comp.create_storage("/Subconto/Subconto_Number5/WorkBook")
        .unwrap();
    write_stream(
        &mut comp,
        "/Subconto/Subconto_Number5/WorkBook/Container.Contents",
        &manifest(&[
            ("TextDocument", "MD Programm text", "form module"),
            ("DialogEditor", "Dialog Stream", "dialog"),
            ("Moxcel.Worksheet", "Sheet1", "Sheet"),
        ]),
    );
    write_stream(
        &mut comp,
        "/Subconto/Subconto_Number5/WorkBook/MD Programm text",
        &deflate(&cp1251(&fixture.form_module)),
    );
    write_stream(
        &mut comp,
        "/Subconto/Subconto_Number5/WorkBook/Dialog Stream",
        &cp1251("Dialog {1,2}"),
    );
    write_stream(
        &mut comp,
        "/Subconto/Subconto_Number5/WorkBook/Sheet1",
        &fixture.worksheet,
    );

    comp.flush().unwrap();
}

fn line_texts(report: &mdcmp_common::Report) -> Vec<String> {
    report.lines.iter().map(|l| l.text.clone()).collect()
}

#[test]
fn loads_catalog_and_resolves_form() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.md");
    write_config(&path, &Fixture::default());

    let config = Configuration::load(&path).unwrap();

    assert_eq!(config.catalogs.len(), 1);
    let catalog = &config.catalogs[0];
    assert_eq!(catalog.identity, "Tovary");
    assert_eq!(catalog.id, 5);

    let form = catalog.form.as_ref().expect("item form resolved");
    assert!(form.dialog_module.is_some());
    assert!(form.dialog.is_some());
    assert_eq!(form.worksheets.len(), 1);

    let module = config
        .tree
        .leaf_module(form.dialog_module.unwrap())
        .expect("form module parsed");
    assert!(module.units.contains_key("Процедура Расчет"));

    assert!(config.global_module.is_some());
    assert_eq!(config.guids.len(), 1);
    assert_eq!(config.guids[0], uuid::Uuid::from_bytes_le([7u8; 16]));
    assert!(config.unknown_categories.is_empty());
}

#[test]
fn identical_configurations_produce_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.md");
    let path_b = dir.path().join("b.md");
    write_config(&path_a, &Fixture::default());
    write_config(&path_b, &Fixture::default());

    let a = Configuration::load(&path_a).unwrap();
    let b = Configuration::load(&path_b).unwrap();

    let report = compare(
        &a,
        &b,
        &DiffOptions {
            diff_module_bodies: true,
            ..Default::default()
        },
    );
    assert!(report.is_empty(), "unexpected lines: {:?}", report.lines);
}

#[test]
fn reloading_identical_bytes_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.md");
    write_config(&path, &Fixture::default());

    let first = Configuration::load(&path).unwrap();
    let second = Configuration::load(&path).unwrap();

    assert_eq!(first.descriptor_checksum, second.descriptor_checksum);
    assert_eq!(
        first.tree.leaf_checksum(first.global_module.unwrap()),
        second.tree.leaf_checksum(second.global_module.unwrap())
    );
    let report = compare(&first, &second, &DiffOptions::default());
    assert!(report.is_empty());
}

#[test]
fn one_changed_unit_with_added_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.md");
    let path_b = dir.path().join("b.md");
    write_config(
        &path_a,
        &Fixture {
            form_module: FORM_MODULE_WITH_PARAM.to_string(),
            ..Default::default()
        },
    );
    write_config(&path_b, &Fixture::default());

    let a = Configuration::load(&path_a).unwrap();
    let b = Configuration::load(&path_b).unwrap();

    let report = compare(
        &a,
        &b,
        &DiffOptions {
            diff_module_bodies: true,
            ..Default::default()
        },
    );

    assert_eq!(
        line_texts(&report),
        vec![
            "Catalog.Tovary.ItemForm.Module",
            "Процедура Расчет()",
            "Added parameter \"Ставка\"",
        ]
    );
}

#[test]
fn document_present_only_in_first_is_added_without_recursion() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.md");
    let path_b = dir.path().join("b.md");
    write_config(
        &path_a,
        &Fixture {
            mms_body: mms_with_document(),
            ..Default::default()
        },
    );
    write_config(&path_b, &Fixture::default());

    let a = Configuration::load(&path_a).unwrap();
    let b = Configuration::load(&path_b).unwrap();
    assert_eq!(a.documents.len(), 1);

    let report = compare(
        &a,
        &b,
        &DiffOptions {
            diff_module_bodies: true,
            ..Default::default()
        },
    );

    assert_eq!(
        line_texts(&report),
        vec!["Metadata structure changed", "Added: Document.Schet"]
    );
}

#[test]
fn changed_worksheet_reported_by_description() {
    let dir = tempfile::tempdir().unwrap();
    let path_a = dir.path().join("a.md");
    let path_b = dir.path().join("b.md");
    write_config(&path_a, &Fixture::default());
    write_config(
        &path_b,
        &Fixture {
            worksheet: vec![0xAA, 0xBB],
            ..Default::default()
        },
    );

    let a = Configuration::load(&path_a).unwrap();
    let b = Configuration::load(&path_b).unwrap();

    let report = compare(&a, &b, &DiffOptions::default());
    assert_eq!(
        line_texts(&report),
        vec!["Worksheet Catalog.Tovary.ItemForm.Sheet"]
    );
}

#[test]
fn orphan_physical_element_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.md");
    write_config(&path, &Fixture::default());
    {
        let mut comp = cfb::open_rw(&path).unwrap();
        {
            let mut stream = comp.create_stream("/Metadata/Orphan").unwrap();
            stream.write_all(b"stray").unwrap();
        }
        comp.flush().unwrap();
    }

    let config = Configuration::load(&path).unwrap();
    assert!(config.warnings.iter().any(|w| matches!(
        w,
        Warning::StructureMismatch { detail, .. } if detail.contains("Orphan")
    )));
    // the load itself still succeeds in full
    assert_eq!(config.catalogs.len(), 1);
}

#[test]
fn cancellation_between_top_level_elements() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.md");
    write_config(&path, &Fixture::default());

    let cancel = AtomicBool::new(true);
    match Configuration::load_with(&path, None, Some(&cancel)) {
        Err(MdCmpError::Cancelled) => {}
        other => panic!("expected cancellation, got {:?}", other.err()),
    }
}

#[test]
fn non_container_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, b"just text, no container").unwrap();

    match Configuration::load(&path) {
        Err(MdCmpError::ContainerFormat(_)) => {}
        other => panic!("expected format error, got {:?}", other.err()),
    }
}
