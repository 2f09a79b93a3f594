//! Encode a config to binary, read one class back without decoding
//! the rest, and render the whole file as text again.

fn main() {
    let input = "\
class CfgPatches { class my_addon { units[] = {}; requiredVersion = 0.1; }; };
class CfgWeapons { class Rifle { magazines[] = {\"30Rnd\", \"20Rnd\"}; }; };
";

    let bytes = rapconf::rapify_str(input).expect("rapify failed");
    println!("Encoded {} bytes of text into {} bytes", input.len(), bytes.len());

    let rifle = rapconf::decode_class(&bytes, "CfgWeapons/Rifle")
        .expect("decode failed")
        .expect("Rifle is present");
    println!("Rifle has {} properties", rifle.properties.len());

    let text = rapconf::derap(&bytes).expect("derap failed");
    println!("\nDecoded text:\n{text}");
}
