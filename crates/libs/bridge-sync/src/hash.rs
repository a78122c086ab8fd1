//! Canonical content hash of a [`UiSnapshot`].
//!
//! Every field is written with an explicit length or tag so that no two
//! distinct snapshots share an encoding. Property maps are `BTreeMap`s and
//! therefore already key-ordered. The capture timestamp is not hashed.

use bridge_ipc::{
    canonical_float_bits, ComponentNode, PropertyMap, ScalarValue, StateHash, UiSnapshot,
};
use sha2::{Digest, Sha256};

const DOMAIN: &[u8] = b"sbx.bridge.ui-state.v1";

pub fn calculate_state_hash(snapshot: &UiSnapshot) -> StateHash {
    let mut hasher = CanonicalHasher::new();
    hasher.write_str(&snapshot.screen_id);
    hasher.write_str(&snapshot.title);
    hasher.write_map(&snapshot.data);
    hasher.write_nodes(&snapshot.components);
    hasher.finish()
}

struct CanonicalHasher(Sha256);

impl CanonicalHasher {
    fn new() -> Self {
        let mut inner = Sha256::new();
        inner.update(DOMAIN);
        Self(inner)
    }

    fn write_len(&mut self, len: usize) {
        self.0.update((len as u64).to_be_bytes());
    }

    fn write_str(&mut self, value: &str) {
        self.write_len(value.len());
        self.0.update(value.as_bytes());
    }

    fn write_scalar(&mut self, value: &ScalarValue) {
        match value {
            ScalarValue::Null => self.0.update([0x00]),
            ScalarValue::Bool(b) => self.0.update([0x01, u8::from(*b)]),
            ScalarValue::Int(i) => {
                self.0.update([0x02]);
                self.0.update(i.to_be_bytes());
            }
            ScalarValue::Float(f) => {
                // Must agree with `ScalarValue` equality.
                self.0.update([0x03]);
                self.0.update(canonical_float_bits(*f).to_be_bytes());
            }
            ScalarValue::Text(s) => {
                self.0.update([0x04]);
                self.write_str(s);
            }
        }
    }

    fn write_map(&mut self, map: &PropertyMap) {
        self.write_len(map.len());
        for (key, value) in map {
            self.write_str(key);
            self.write_scalar(value);
        }
    }

    fn write_nodes(&mut self, nodes: &[ComponentNode]) {
        self.write_len(nodes.len());
        for node in nodes {
            self.write_str(&node.id);
            self.write_str(&node.kind);
            self.write_map(&node.properties);
            self.write_nodes(&node.children);
        }
    }

    fn finish(self) -> StateHash {
        StateHash(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> UiSnapshot {
        UiSnapshot::new("settings", "Settings")
            .with_data("user", "ada")
            .with_component(
                ComponentNode::new("theme", "toggle")
                    .with_property("checked", true)
                    .with_property("label", "Dark mode"),
            )
            .with_component(
                ComponentNode::new("audio", "group").with_child(
                    ComponentNode::new("volume-row", "row").with_child(
                        ComponentNode::new("volume", "slider").with_property("value", 0.5),
                    ),
                ),
            )
    }

    #[test]
    fn hash_is_stable_and_ignores_timestamp() {
        let a = snapshot();
        let mut b = snapshot();
        b.timestamp = a.timestamp + 60_000;
        assert_eq!(calculate_state_hash(&a), calculate_state_hash(&b));
        assert_eq!(calculate_state_hash(&a).to_hex().len(), 64);
    }

    #[test]
    fn property_insertion_order_does_not_matter() {
        let a = ComponentNode::new("x", "box")
            .with_property("a", 1)
            .with_property("b", 2);
        let b = ComponentNode::new("x", "box")
            .with_property("b", 2)
            .with_property("a", 1);
        let left = UiSnapshot::new("s", "t").with_component(a);
        let right = UiSnapshot::new("s", "t").with_component(b);
        assert_eq!(calculate_state_hash(&left), calculate_state_hash(&right));
    }

    #[test]
    fn content_changes_change_the_hash() {
        let base = calculate_state_hash(&snapshot());

        let mut retitled = snapshot();
        retitled.title.push('!');
        assert_ne!(base, calculate_state_hash(&retitled));

        let mut toggled = snapshot();
        toggled.components[0]
            .properties
            .insert("checked".into(), false.into());
        assert_ne!(base, calculate_state_hash(&toggled));

        let mut reordered = snapshot();
        reordered.components.reverse();
        assert_ne!(base, calculate_state_hash(&reordered));
    }

    #[test]
    fn nested_changes_change_the_hash() {
        let base = calculate_state_hash(&snapshot());

        let mut tweaked = snapshot();
        tweaked.components[1].children[0].children[0]
            .properties
            .insert("value".into(), 0.75.into());
        assert_ne!(base, calculate_state_hash(&tweaked));

        let mut retyped = snapshot();
        retyped.components[1].children[0].kind = "column".into();
        assert_ne!(base, calculate_state_hash(&retyped));

        let mut renamed = snapshot();
        renamed.components[1].children[0].children[0].id = "balance".into();
        assert_ne!(base, calculate_state_hash(&renamed));

        let mut extra = snapshot();
        extra.components[1].children[0]
            .children
            .push(ComponentNode::new("mute", "toggle"));
        assert_ne!(base, calculate_state_hash(&extra));
    }

    #[test]
    fn nested_child_order_changes_the_hash() {
        let group = |first: &str, second: &str| {
            UiSnapshot::new("s", "t").with_component(
                ComponentNode::new("form", "column").with_child(
                    ComponentNode::new("fields", "column")
                        .with_child(ComponentNode::new(first, "input"))
                        .with_child(ComponentNode::new(second, "input")),
                ),
            )
        };
        assert_ne!(
            calculate_state_hash(&group("a", "b")),
            calculate_state_hash(&group("b", "a"))
        );
    }

    #[test]
    fn equal_floats_hash_equal() {
        let with = |value: f64| UiSnapshot::new("s", "t").with_data("v", value);
        assert_eq!(
            calculate_state_hash(&with(0.0)),
            calculate_state_hash(&with(-0.0))
        );
        assert_eq!(
            calculate_state_hash(&with(f64::NAN)),
            calculate_state_hash(&with(-f64::NAN))
        );
        assert_ne!(
            calculate_state_hash(&with(0.5)),
            calculate_state_hash(&with(0.25))
        );
    }

    #[test]
    fn scalar_types_are_distinguished() {
        let int = UiSnapshot::new("s", "t").with_data("v", 1);
        let text = UiSnapshot::new("s", "t").with_data("v", "1");
        let flag = UiSnapshot::new("s", "t").with_data("v", true);
        let hashes = [&int, &text, &flag].map(calculate_state_hash);
        assert_ne!(hashes[0], hashes[1]);
        assert_ne!(hashes[0], hashes[2]);
        assert_ne!(hashes[1], hashes[2]);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = UiSnapshot::new("ab", "c");
        let b = UiSnapshot::new("a", "bc");
        assert_ne!(calculate_state_hash(&a), calculate_state_hash(&b));
    }
}
