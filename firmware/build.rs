//! Exports deployment settings and the RP2040 linker setup.
//!
//! Values come from the environment or an optional `.env` file next to the
//! workspace root. Missing entries fall back to the bench defaults.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;

const SETTINGS: [(&str, &str); 4] = [
    ("COMPRESSOR_SERVER_ADDR", "192.168.10.44"),
    ("COMPRESSOR_SERVER_PORT", "3000"),
    ("COMPRESSOR_AP_SSID", "Pico-Compressor"),
    ("COMPRESSOR_AP_PASSWORD", "password"),
];

fn main() {
    let _ = dotenvy::dotenv();

    let mut values = Vec::new();
    for (key, default) in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = env::var(key).unwrap_or_else(|_| default.to_owned());
        println!("cargo:rustc-env={key}={value}");
        values.push(value);
    }
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=../.env");

    let server: Ipv4Addr = values[0]
        .parse()
        .unwrap_or_else(|_| panic!("COMPRESSOR_SERVER_ADDR is not an IPv4 address: {}", values[0]));
    let port: u16 = values[1]
        .parse()
        .unwrap_or_else(|_| panic!("COMPRESSOR_SERVER_PORT is not a port: {}", values[1]));
    assert!(
        (8..=63).contains(&values[3].len()),
        "COMPRESSOR_AP_PASSWORD must be 8 to 63 characters for WPA2"
    );

    let mut generated = String::new();
    let [a, b, c, d] = server.octets();
    writeln!(generated, "pub const SERVER_ADDR: [u8; 4] = [{a}, {b}, {c}, {d}];")
        .expect("format deployment constants");
    writeln!(generated, "pub const SERVER_PORT: u16 = {port};").expect("format deployment constants");

    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out.join("deployment.rs"), generated).expect("write deployment.rs");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        fs::write(out.join("memory.x"), include_bytes!("memory.x")).expect("write memory.x");
        println!("cargo:rustc-link-search={}", out.display());
        println!("cargo:rerun-if-changed=memory.x");
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
