//! Translation of accelerated-channel error tokens.

/// Known error tokens and their descriptions.
const ERROR_TABLE: &[(&[&str], &str)] = &[
    (&["cmd", "syntax", "notimpl"], "Problems with parsing command"),
    (
        &["authtype", "unauth"],
        "You need to authenticate before execute commands",
    ),
    (&["open_table"], "Something goes wrong or wrong DB/table name"),
    (
        &["tblnum", "stmtnum"],
        "You try to use un initialized index number",
    ),
    (&["invalueslen"], "Wrong IN values list size"),
    (&["filtertype"], "Wrong filter TYPE"),
    (&["filterfld"], "You filter column size < filter offset"),
    (&["lock_tables", "modop"], "You try to open locked table"),
    (&["idxnum"], "Key index > opened columns count"),
    (&["kpnum", "klen"], "Key length > key values or key length <= 0"),
    (
        &["op"],
        "Unknown comparison operator, you can use only '>', '<', '>=', '<='.",
    ),
    (
        &["readonly"],
        "You try to execute modify command on read only socket",
    ),
    (
        &["fld"],
        "Something goes wrong on parse column or filter column",
    ),
];

/// Description of numeric tokens, which carry internal MySQL errors.
const NUMERIC_ERROR: &str =
    "If you try to insert data with wrong values, wrong keys (internal MySQL errors)";

const UNKNOWN_ERROR: &str = "Unknown error";

/// Renders an error token as `[token] description`.
pub fn describe_error(code: &str) -> String {
    let description = ERROR_TABLE
        .iter()
        .find(|(codes, _)| codes.contains(&code))
        .map(|(_, description)| *description)
        .unwrap_or_else(|| {
            if code.parse::<f64>().is_ok_and(f64::is_finite) {
                NUMERIC_ERROR
            } else {
                UNKNOWN_ERROR
            }
        });
    format!("[{code}] {description}")
}
