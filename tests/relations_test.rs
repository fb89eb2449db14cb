mod helpers;

use cairn::memory::relations::{link, linked_from, linked_to, unlink};
use cairn::memory::store::{get_item, remove_item};
use cairn::memory::types::Relation;
use helpers::{add_keyword_item, test_storage};

#[test]
fn supersedes_link_writes_inverse_edge() {
    let (_tmp, storage) = test_storage();
    add_keyword_item(&storage, "old", "Use the v1 endpoint.", &["endpoint"]);
    add_keyword_item(&storage, "new", "Use the v2 endpoint.", &["endpoint"]);

    let result = link(&storage, "new", "old", Relation::Supersedes, "v2 shipped", true)
        .unwrap()
        .unwrap();
    assert!(!result.replaced);
    assert_eq!(result.reverse, Some(Relation::SupersededBy));

    let new = get_item(&storage, "new").unwrap();
    let edge = new.link_to("old").unwrap();
    assert_eq!(edge.relation, Relation::Supersedes);
    assert_eq!(edge.note, "v2 shipped");

    let old = get_item(&storage, "old").unwrap();
    assert_eq!(old.link_to("new").unwrap().relation, Relation::SupersededBy);
}

#[test]
fn one_way_link_leaves_target_untouched() {
    let (_tmp, storage) = test_storage();
    add_keyword_item(&storage, "a", "alpha", &[]);
    add_keyword_item(&storage, "b", "beta", &[]);

    let result = link(&storage, "a", "b", Relation::Extends, "", false).unwrap().unwrap();
    assert_eq!(result.reverse, None);
    assert!(get_item(&storage, "b").unwrap().links.is_empty());
}

#[test]
fn linking_missing_items_fails_softly() {
    let (_tmp, storage) = test_storage();
    add_keyword_item(&storage, "a", "alpha", &[]);

    assert!(link(&storage, "a", "ghost", Relation::Related, "", true).unwrap().is_none());
    assert!(link(&storage, "ghost", "a", Relation::Related, "", true).unwrap().is_none());
    assert!(link(&storage, "a", "a", Relation::Related, "", false).unwrap().is_none());
    assert!(get_item(&storage, "a").unwrap().links.is_empty());
}

#[test]
fn relinking_replaces_instead_of_duplicating() {
    let (_tmp, storage) = test_storage();
    add_keyword_item(&storage, "a", "alpha", &[]);
    add_keyword_item(&storage, "b", "beta", &[]);

    link(&storage, "a", "b", Relation::Related, "first", true).unwrap();
    let second = link(&storage, "a", "b", Relation::Contradicts, "second", true)
        .unwrap()
        .unwrap();
    assert!(second.replaced);

    let a = get_item(&storage, "a").unwrap();
    assert_eq!(a.links.len(), 1);
    assert_eq!(a.links[0].relation, Relation::Contradicts);
    assert_eq!(a.links[0].note, "second");

    let b = get_item(&storage, "b").unwrap();
    assert_eq!(b.links.len(), 1);
    assert_eq!(b.links[0].relation, Relation::Contradicts);
}

#[test]
fn traversal_on_a_cycle_terminates() {
    let (_tmp, storage) = test_storage();
    for id in ["a", "b", "c"] {
        add_keyword_item(&storage, id, id, &[]);
    }
    link(&storage, "a", "b", Relation::Related, "", false).unwrap();
    link(&storage, "b", "a", Relation::Related, "", false).unwrap();
    link(&storage, "b", "c", Relation::Extends, "", false).unwrap();
    link(&storage, "c", "a", Relation::Related, "", false).unwrap();

    let reached = linked_from(&storage, "a", 10);
    let ids: Vec<&str> = reached.iter().map(|l| l.item.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(reached[0].depth, 1);
    assert_eq!(reached[1].depth, 2);
    assert_eq!(reached[1].relation, Relation::Extends);

    let one_hop = linked_from(&storage, "a", 1);
    assert_eq!(one_hop.len(), 1);
    assert_eq!(one_hop[0].item.id, "b");
}

#[test]
fn removed_target_leaves_dangling_edge_that_traversal_skips() {
    let (_tmp, storage) = test_storage();
    for id in ["a", "b", "c"] {
        add_keyword_item(&storage, id, id, &[]);
    }
    link(&storage, "a", "b", Relation::Related, "", false).unwrap();
    link(&storage, "a", "c", Relation::Related, "", false).unwrap();

    assert!(remove_item(&storage, "b").unwrap());

    // The edge is kept on disk.
    assert!(get_item(&storage, "a").unwrap().link_to("b").is_some());

    let reached = linked_from(&storage, "a", 3);
    assert_eq!(reached.len(), 1);
    assert_eq!(reached[0].item.id, "c");
}

#[test]
fn unlink_and_incoming_links() {
    let (_tmp, storage) = test_storage();
    for id in ["a", "b", "hub"] {
        add_keyword_item(&storage, id, id, &[]);
    }
    link(&storage, "a", "hub", Relation::Related, "", false).unwrap();
    link(&storage, "b", "hub", Relation::Extends, "", false).unwrap();

    let incoming = linked_to(&storage, "hub");
    let ids: Vec<&str> = incoming.iter().map(|l| l.item.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    assert!(unlink(&storage, "a", "hub").unwrap());
    assert!(!unlink(&storage, "a", "hub").unwrap());
    assert_eq!(linked_to(&storage, "hub").len(), 1);
}
