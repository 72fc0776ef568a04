use std::env;
use std::path::Path;

const REFERENCE_FILES: &[&str] = &[
    "stocks.csv",
    "funds.csv",
    "etfs.csv",
    "indices.csv",
    "currency_crosses.csv",
    "bonds.csv",
    "commodities.csv",
    "cryptos.csv",
    "certificates.csv",
];

fn main() {
    // 获取项目根目录
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };

    // 检查参考数据是否齐全
    let resources = Path::new(&manifest_dir).join("resources");
    println!("cargo:rerun-if-changed=resources");

    let missing: Vec<&str> = REFERENCE_FILES
        .iter()
        .copied()
        .filter(|file| !resources.join(file).exists())
        .collect();

    if !missing.is_empty() {
        println!(
            "cargo:warning=reference files missing from resources/: {}",
            missing.join(", ")
        );
        println!("cargo:warning=Lookups for those instrument families will fail until the CSVs are added.");
    }
}
