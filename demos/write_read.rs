//! Writes a table file, reopens it and runs a few lookups and a scan.

use numtable::{Reader, Writer, WriterOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::temp_dir().join("numtable-demo.ntb");

    // Append entries in strictly increasing key order.
    let mut writer = Writer::create(&path, WriterOptions::default())?;
    for key in (0..1_000u64).step_by(3) {
        let value = format!("payload-{:06}", key);
        writer.append(key, value.as_bytes())?;
    }
    writer.close()?;

    let reader = Reader::open_path(&path)?;
    println!("table has {} blocks", reader.num_blocks());

    let value = reader.get(300)?;
    println!("key 300 => {}", String::from_utf8_lossy(&value));

    match reader.get(301) {
        Err(e) if e.is_not_found() => println!("key 301 is absent"),
        other => {
            other?;
        }
    }

    println!("scanning from key 990:");
    let mut iter = reader.seek(990)?;
    while iter.next() {
        println!("  {} => {}", iter.key(), String::from_utf8_lossy(iter.value()));
    }
    iter.release();

    std::fs::remove_file(&path)?;
    Ok(())
}
