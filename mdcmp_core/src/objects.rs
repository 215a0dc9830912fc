//! Logical metadata objects described by the root descriptor stream. Each
//! object carries its numeric ID, its identity (unique within its collection)
//! and handles into the container tree for the streams that back it.

use crate::container::{ContainerTree, NodeId, StorageRole};

/// A form attached to an object: dialog layout, dialog module and any
/// worksheet sub-documents, located by role inside a `WorkBook` container.
#[derive(Debug, Clone, Default)]
pub struct Form {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub description: String,
    pub dialog: Option<NodeId>,
    pub dialog_module: Option<NodeId>,
    pub worksheets: Vec<NodeId>,
}

impl Form {
    pub fn from_container(tree: &ContainerTree, container: NodeId) -> Self {
        Form {
            dialog_module: tree.child_by_role(container, StorageRole::TextDocument),
            dialog: tree.child_by_role(container, StorageRole::DialogEditor),
            worksheets: tree.children_by_role(container, StorageRole::MoxcelWorksheet),
            ..Default::default()
        }
    }
}

/// Positional attribute record captured from a `Params` sub-group.
#[derive(Debug, Clone)]
pub struct AttributeRecord {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub description: String,
}

/// Master-data catalog ("Subconto"). The 18 positional fields of its
/// descriptor record are a parsing contract; see the descriptor parser.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub id: i32,
    pub identity: String,
    pub description: String,
    pub alias: String,
    pub parent: i32,
    pub code_length: i32,
    pub code_series: i32,
    pub code_type: i32,
    pub auto_numbering: i32,
    pub name_length: i32,
    pub main_representation: i32,
    pub edit_mode: i32,
    pub level_count: i32,
    pub select_form_id: i32,
    pub main_form_id: i32,
    pub one_form: i32,
    pub unique_codes: i32,
    pub groups_on_top: i32,
    pub form: Option<Form>,
    pub folder_form: Option<Form>,
    pub list_forms: Vec<Form>,
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub form: Option<Form>,
    pub transaction_module: Option<NodeId>,
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub list_forms: Vec<Form>,
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct CalcJournal {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub list_forms: Vec<Form>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportItem {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub form: Option<Form>,
}

/// Data processing ("CalcVar").
#[derive(Debug, Clone, Default)]
pub struct Processing {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub form: Option<Form>,
}

#[derive(Debug, Clone, Default)]
pub struct CalculationAlgorithm {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub calculation_module: Option<NodeId>,
}

/// Accounting parameters: four form collections selected by the encounter
/// order of `Form` sub-records in the descriptor stream.
#[derive(Debug, Clone, Default)]
pub struct AccountingParameters {
    pub id: i32,
    pub identity: String,
    pub alias: String,
    pub account_chart: Vec<Form>,
    pub account_chart_list: Vec<Form>,
    pub transaction_list: Vec<Form>,
    pub operation_list: Vec<Form>,
}
