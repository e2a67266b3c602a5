//! Tag-path queries over an exported timer tree
//!
//! Every query starts at the first `build_curves` child of the root and
//! walks children by tag. Missing steps yield nothing rather than an
//! error, so a partially failed report still answers with the anchors it
//! reached.
//!
//! Anchor-level queries flatten across anchors; epoch-level queries keep
//! one inner list per anchor whose fit emitted an `epoch_train` node.

use crate::curvedb::SplitName;
use serde_json::Value;

/// Children of `node` carrying `tag`, in creation order
pub fn children_tagged<'a>(node: &'a Value, tag: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    node.get("children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(move |child| child.get("tag").and_then(Value::as_str) == Some(tag))
}

fn first_tagged<'a>(node: &'a Value, tag: &'a str) -> Option<&'a Value> {
    children_tagged(node, tag).next()
}

/// Logged value of a node (`metadata.value`)
#[must_use]
pub fn node_value(node: &Value) -> Option<&Value> {
    node.get("metadata")?.get("value")
}

/// Anchor nodes of the first `build_curves` scope
#[must_use]
pub fn anchor_nodes(tree: &Value) -> Vec<&Value> {
    first_tagged(tree, "build_curves")
        .map(|build| children_tagged(build, "anchor").collect())
        .unwrap_or_default()
}

/// Anchor sizes in evaluation order
#[must_use]
pub fn anchor_values(tree: &Value) -> Vec<u64> {
    anchor_nodes(tree)
        .into_iter()
        .filter_map(|anchor| node_value(anchor)?.as_u64())
        .collect()
}

/// Child lists of every anchor node
#[must_use]
pub fn anchors_children(tree: &Value) -> Vec<&[Value]> {
    anchor_nodes(tree)
        .into_iter()
        .map(|anchor| {
            anchor
                .get("children")
                .and_then(Value::as_array)
                .map_or(&[][..], Vec::as_slice)
        })
        .collect()
}

/// One metric of one split, across all anchors
///
/// Follows `anchor → metrics → split → metric`; the values are those
/// written by [`crate::curve::Curve::compute_metrics`] (scalars or the
/// confusion matrix).
#[must_use]
pub fn metric_values_from_anchors(tree: &Value, metric: &str, split: SplitName) -> Vec<Value> {
    anchor_nodes(tree)
        .into_iter()
        .flat_map(|anchor| children_tagged(anchor, "metrics"))
        .flat_map(|metrics| children_tagged(metrics, split.as_str()))
        .flat_map(|split_node| children_tagged(split_node, metric))
        .filter_map(|node| node_value(node).cloned())
        .collect()
}

fn epoch_nodes(anchor: &Value) -> Option<Vec<&Value>> {
    let fit = first_tagged(anchor, "fit")?;
    let epoch_train = first_tagged(fit, "epoch_train")?;
    Some(children_tagged(epoch_train, "epoch").collect())
}

/// Epoch numbers per anchor
///
/// With `with_epoch_test`, only epochs that were evaluated (those with an
/// `epoch_test` child) are listed.
#[must_use]
pub fn epoch_values(tree: &Value, with_epoch_test: bool) -> Vec<Vec<u64>> {
    anchor_nodes(tree)
        .into_iter()
        .filter_map(epoch_nodes)
        .map(|epochs| {
            epochs
                .into_iter()
                .filter(|epoch| !with_epoch_test || first_tagged(epoch, "epoch_test").is_some())
                .filter_map(|epoch| node_value(epoch)?.as_u64())
                .collect()
        })
        .collect()
}

/// One metric of one split per evaluated epoch, per anchor
///
/// Follows `epoch → epoch_test → metrics → split → metric`, taking the
/// first match at every step.
#[must_use]
pub fn metric_values_from_epochs(tree: &Value, metric: &str, split: SplitName) -> Vec<Vec<Value>> {
    anchor_nodes(tree)
        .into_iter()
        .filter_map(epoch_nodes)
        .map(|epochs| {
            epochs
                .into_iter()
                .filter_map(|epoch| {
                    let test = first_tagged(epoch, "epoch_test")?;
                    let metrics = first_tagged(test, "metrics")?;
                    let split_node = first_tagged(metrics, split.as_str())?;
                    node_value(first_tagged(split_node, metric)?).cloned()
                })
                .collect()
        })
        .collect()
}
