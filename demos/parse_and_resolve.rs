//! Parse a config with inheritance and print each class's effective
//! properties.

fn main() {
    let input = r#"
#define SPEED(x) maxSpeed = x
class CfgVehicles
{
	class Car
	{
		SPEED(120);
		crew[] = {"driver"};
	};
	class Offroad: Car
	{
		crew[] += {"gunner"};
		armor = 5.5;
	};
};
"#;

    let tree = rapconf::parse_str(input).expect("parse failed");
    let resolved = rapconf::resolve(&tree).expect("resolve failed");

    for (path, class) in resolved.resolve_all().expect("merge failed") {
        match &class.parent {
            Some(parent) => println!("{path} (inherits {parent})"),
            None => println!("{path}"),
        }
        for (name, value) in &class.properties {
            println!("  {name} = {value}");
        }
    }
}
