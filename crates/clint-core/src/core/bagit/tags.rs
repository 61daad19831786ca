use super::Tags;

/// Catalog identity of the bag, written at registration.
pub const BAG_ID_TAG: &str = "Catalog-Bag-Id";
/// Catalog identity of the owning item.
pub const ITEM_ID_TAG: &str = "Catalog-Item-Id";

pub(super) const BAGGING_DATE: &str = "Bagging-Date";
pub(super) const PAYLOAD_OXUM: &str = "Payload-Oxum";

/// Tags recomputed on every packaging run.
pub(super) fn is_generated(label: &str) -> bool {
    label.eq_ignore_ascii_case(BAGGING_DATE) || label.eq_ignore_ascii_case(PAYLOAD_OXUM)
}

/// Parses `Label: value` lines; indented lines continue the previous value.
pub(super) fn parse(contents: &str) -> Result<Tags, String> {
    let mut tags = Tags::new();
    let mut last: Option<String> = None;
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with([' ', '\t']) {
            let label = last
                .as_ref()
                .ok_or_else(|| format!("line {}: continuation without a tag", index + 1))?;
            if let Some(value) = tags.get_mut(label) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        let (label, value) = line
            .split_once(':')
            .ok_or_else(|| format!("line {}: expected 'Label: value'", index + 1))?;
        let label = label.trim().to_string();
        tags.insert(label.clone(), value.trim().to_string());
        last = Some(label);
    }
    Ok(tags)
}

pub(super) fn render(tags: &Tags) -> String {
    tags.iter()
        .map(|(label, value)| format!("{label}: {value}\n"))
        .collect()
}

/// Case-insensitive lookup, as BagIt labels are.
pub(crate) fn find<'a>(tags: &'a Tags, label: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(label))
        .map(|(_, value)| value.as_str())
}
