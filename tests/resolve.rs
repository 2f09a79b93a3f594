//! Inheritance resolution through the full pipeline.

use rapconf::{
    ClassKind, ClassNode, ClassTree, Error, Pattern, ResolveErrorKind, ResolvedClass, Value,
    load_str, parse_str, resolve,
};

fn class(input: &str, path: &str) -> ResolvedClass {
    let tree = parse_str(input).expect("parse");
    let resolved = resolve(&tree).expect("resolve");
    resolved
        .class(path)
        .expect("merge")
        .unwrap_or_else(|| panic!("{path} not found"))
}

fn resolve_err(input: &str) -> ResolveErrorKind {
    match load_str(input) {
        Err(Error::Resolve(err)) => err.kind,
        other => panic!("expected a resolve error, got {other:?}"),
    }
}

// -----------------------------------------------------------
// Merging.
// -----------------------------------------------------------

#[test]
fn three_level_chain() {
    let input = "\
        class Vehicle { maxSpeed = 100; armor = 10; crew[] = {\"driver\"}; };\n\
        class Car : Vehicle { maxSpeed = 120; crew[] += {\"gunner\"}; };\n\
        class Offroad : Car { armor = 5; };\n";
    let offroad = class(input, "Offroad");
    assert_eq!(offroad.parent.as_deref(), Some("Car"));
    assert_eq!(offroad.get("maxSpeed"), Some(&Value::Int(120)));
    assert_eq!(offroad.get("armor"), Some(&Value::Int(5)));
    assert_eq!(
        offroad.get("crew"),
        Some(&Value::Array(vec![
            Value::String("driver".to_string()),
            Value::String("gunner".to_string()),
        ]))
    );
    // first-declaration order, base class first
    let names: Vec<&str> = offroad.properties.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(names, ["maxSpeed", "armor", "crew"]);
}

#[test]
fn property_names_are_case_insensitive() {
    let input = "class A { Value = 1; }; class B : A { VALUE = 2; };";
    let b = class(input, "b");
    assert_eq!(b.properties.len(), 1);
    assert_eq!(b.get("value"), Some(&Value::Int(2)));
}

#[test]
fn subtract_compares_numbers_by_value() {
    let input = "class A { v[] = {1, 2.0, \"3\"}; }; class B : A { v[] -= {2, 1.0}; };";
    assert_eq!(
        class(input, "B").get("v"),
        Some(&Value::Array(vec![Value::String("3".to_string())]))
    );
}

#[test]
fn subtract_keeps_distinct_large_integers() {
    let input = "class A { v[] = {9007199254740993, 5}; }; \
                 class B : A { v[] -= {9007199254740992}; };";
    assert_eq!(
        class(input, "B").get("v"),
        Some(&Value::Array(vec![Value::Int(9_007_199_254_740_993), Value::Int(5)]))
    );
}

#[test]
fn subtract_keeps_nearly_equal_floats() {
    let input = "class A { v[] = {1.0000000000000002, 5}; }; class B : A { v[] -= {1}; };";
    assert_eq!(
        class(input, "B").get("v"),
        Some(&Value::Array(vec![Value::Float(1.000_000_000_000_000_2), Value::Int(5)]))
    );
}

#[test]
fn subtract_removes_every_occurrence() {
    let input = "class A { v[] = {\"a\", \"b\", \"a\"}; }; class B : A { v[] -= {\"a\"}; };";
    assert_eq!(
        class(input, "B").get("v"),
        Some(&Value::Array(vec![Value::String("b".to_string())]))
    );
}

#[test]
fn reopened_class_merges_bodies() {
    let input = "class A { x = 1; }; class A { y = 2; x = 3; };";
    let a = class(input, "A");
    assert_eq!(a.get("x"), Some(&Value::Int(3)));
    assert_eq!(a.get("y"), Some(&Value::Int(2)));
}

#[test]
fn nested_classes_are_inherited() {
    let input = "\
        class Base { class Turrets { class Main { gun = \"cannon\"; }; }; };\n\
        class Tank : Base {};\n";
    let tank = class(input, "Tank");
    assert!(tank.has_class("Turrets"));
}

#[test]
fn nested_class_extends_inherited_sibling() {
    let input = "\
        class Base { class Turrets { class Main { gun = \"cannon\"; }; }; };\n\
        class Tank : Base { class Turrets : Turrets { class Main : Main { ammo = 40; }; }; };\n";
    let main = class(input, "Tank/Turrets/Main");
    assert_eq!(main.parent.as_deref(), Some("Base/Turrets/Main"));
    assert_eq!(main.get("gun").and_then(Value::as_str), Some("cannon"));
    assert_eq!(main.get("ammo"), Some(&Value::Int(40)));
}

#[test]
fn delete_hides_inherited_nested_class() {
    let input = "\
        class Base { class Hitpoints {}; class Sounds {}; };\n\
        class Derived : Base { delete Hitpoints; };\n";
    let derived = class(input, "Derived");
    assert_eq!(derived.classes, ["Sounds"]);
}

#[test]
fn forward_reference_to_later_sibling() {
    let input = "class B : A { b = 1; }; class A { a = 1; };";
    let b = class(input, "B");
    assert_eq!(b.parent.as_deref(), Some("A"));
    assert_eq!(b.get("a"), Some(&Value::Int(1)));
}

#[test]
fn long_chain_declared_child_first() {
    const CHAIN: usize = 50_000;
    let mut tree = ClassTree::new();
    for i in (1..CHAIN).rev() {
        tree = tree.class(ClassNode::new(&format!("C{i}")).inherits(&format!("C{}", i - 1)));
    }
    tree = tree.class(ClassNode::new("C0").set("base", 1));

    let resolved = resolve(&tree).expect("resolve");
    let last = resolved
        .class(&format!("C{}", CHAIN - 1))
        .expect("merge")
        .expect("last class");
    assert_eq!(last.get("base"), Some(&Value::Int(1)));
}

#[test]
fn forward_declared_parent_contributes_nothing() {
    let input = "class RscText; class MyText : RscText { text = \"hi\"; };";
    let text = class(input, "MyText");
    assert_eq!(text.parent.as_deref(), Some("RscText"));
    assert_eq!(text.properties.len(), 1);
}

// -----------------------------------------------------------
// Whole-tree views.
// -----------------------------------------------------------

#[test]
fn paths_and_select() {
    let tree = parse_str(
        "class Mission { class Entities { class Item0 { class Inventory {}; }; \
         class Item1 { class Inventory {}; }; }; };",
    )
    .expect("parse");
    let resolved = resolve(&tree).expect("resolve");
    assert_eq!(resolved.paths().len(), 6);
    assert_eq!(
        resolved.select(&"*/Inventory".parse::<Pattern>().unwrap_or_else(|e| match e {})),
        [
            "Mission/Entities/Item0/Inventory",
            "Mission/Entities/Item1/Inventory",
        ]
    );
    assert!(resolved.select(&Pattern::new("/Inventory")).is_empty());
}

#[test]
fn flatten_produces_plain_assignments() {
    let tree = parse_str(
        "class A { v[] = {1, 2}; }; class B : A { v[] += {3}; }; class A2 : A {}; delete A2;",
    )
    .expect("parse");
    let flat = resolve(&tree).expect("resolve").flatten().expect("flatten");
    assert_eq!(flat.classes.len(), 2);
    let b = flat.find("B").expect("B");
    assert_eq!(b.kind, ClassKind::Definition);
    assert_eq!(b.parent.as_deref(), Some("A"));
    assert_eq!(
        b.property("v").map(|p| (&p.value, p.operator.symbol())),
        Some((
            &Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            "="
        ))
    );
    // flattening is stable
    let again = resolve(&flat).expect("resolve").flatten().expect("flatten");
    assert_eq!(flat, again);
}

#[test]
fn flatten_drops_deleted_parent() {
    let tree = parse_str("class Foo { a = 1; }; class Bar : Foo {}; delete Foo;").expect("parse");
    let flat = resolve(&tree).expect("resolve").flatten().expect("flatten");
    let bar = flat.find("Bar").expect("Bar");
    assert_eq!(bar.parent, None);

    let relinked = resolve(&flat).expect("flattened tree resolves");
    let bar = relinked.class("Bar").expect("merge").expect("Bar");
    assert_eq!(bar.get("a"), Some(&Value::Int(1)));
}

#[test]
fn flatten_cuts_parent_that_would_relink_elsewhere() {
    let tree = parse_str(
        "class T { wrong = 1; };\n\
         class A { class T { right = 1; }; };\n\
         class B : A {};\n\
         class D : B { class S : T {}; };\n\
         delete B;",
    )
    .expect("parse");
    let resolved = resolve(&tree).expect("resolve");
    let s = resolved.class("D/S").expect("merge").expect("D/S");
    assert_eq!(s.parent.as_deref(), Some("A/T"));

    let flat = resolved.flatten().expect("flatten");
    assert_eq!(flat.find("D").and_then(|d| d.parent.as_deref()), None);
    assert_eq!(flat.find("D/S").and_then(|s| s.parent.as_deref()), None);

    let relinked = resolve(&flat).expect("flattened tree resolves");
    let s = relinked.class("D/S").expect("merge").expect("D/S");
    assert_eq!(s.get("right"), Some(&Value::Int(1)));
    assert_eq!(s.get("wrong"), None);
}

#[test]
fn flatten_keeps_effective_properties() {
    let tree = parse_str(
        "class Base { class Turrets { class Main { elevation = 10; }; }; };\n\
         class Tank : Base { class Turrets : Turrets { class Main : Main { ammo[] = {1}; }; }; };\n\
         class Gone { x = 1; };\n\
         class Heir : Gone { y = 2; };\n\
         delete Gone;",
    )
    .expect("parse");
    let resolved = resolve(&tree).expect("resolve");
    let flat = resolved.flatten().expect("flatten");
    let relinked = resolve(&flat).expect("flattened tree resolves");
    for path in resolved.paths() {
        let before = resolved.class(path).expect("merge").expect("class");
        let after = relinked.class(path).expect("merge").expect("class");
        assert_eq!(after.properties, before.properties, "{path}");
    }
    assert_eq!(
        flat.find("Tank/Turrets/Main").and_then(|m| m.parent.as_deref()),
        Some("Main")
    );
}

// -----------------------------------------------------------
// Errors.
// -----------------------------------------------------------

#[test]
fn unknown_parent() {
    assert_eq!(
        resolve_err("class A : Missing {};"),
        ResolveErrorKind::UnknownParent {
            parent: "Missing".to_string()
        }
    );
}

#[test]
fn parent_deleted_before_use() {
    assert_eq!(
        resolve_err("class A {}; delete A; class B : A {};"),
        ResolveErrorKind::UnknownParent {
            parent: "A".to_string()
        }
    );
}

#[test]
fn three_class_cycle() {
    let err = load_str("class A : C {}; class B : A {}; class C : B {};").expect_err("cycle");
    assert_eq!(
        err.to_string(),
        "cyclic inheritance: A -> C -> B -> A in A"
    );
}

#[test]
fn append_to_undeclared_property() {
    let err = load_str("class A {}; class B : A { v[] += {1}; };").expect_err("append");
    let Error::Resolve(err) = err else {
        panic!("expected a resolve error, got {err}");
    };
    assert_eq!(err.path, "B");
    assert!(matches!(
        err.kind,
        ResolveErrorKind::ArrayOperatorOnScalar { operator: "+=", .. }
    ));
}
