//! Write a small 3-D skim file in both sub-formats, then inspect it
//!
//! Run with `RUST_LOG=amx=debug` to see open and read tracing.

use std::time::Instant;

use amx::{
    BackendKind, Label, MatrixFile, MatrixWriter, Selection, Shape, WriteOptions,
};

fn main() -> amx::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // 25 zones by 25 zones by 3 time periods
    let zones: Vec<i64> = (0..25).map(|z| 100 + z * 3).collect();
    let shape = Shape::new(vec![25, 25, 3])?;
    let count = shape.num_elements();

    let mut writer = MatrixWriter::new(shape);
    writer
        .add_variable("DIST", (0..count).map(|i| (i / 3) as f32 * 0.25).collect())?
        .add_variable("TIME", (0..count).map(|i| (i % 97) as f64).collect())?
        .add_lookup("ORIG", zones.iter().copied().map(Label::Int).collect(), Some(0))?
        .add_lookup("DEST", zones.iter().copied().map(Label::Int).collect(), Some(1))?
        .add_lookup(
            "PERIOD",
            ["AM", "MD", "PM"].into_iter().map(Label::from).collect(),
            Some(2),
        )?;

    let dir = std::env::temp_dir().join("amx-inspect");
    std::fs::create_dir_all(&dir)?;
    let options = WriteOptions::default()
        .with_overwrite(true)
        .with_row_group_size(WriteOptions::row_group_size_for(&[25, 25, 3], 300));
    let columnar = dir.join("skims.parquet");
    let mapped = dir.join("skims.arrow");
    writer.write_columnar(&columnar, &options)?;
    writer.write_mapped(&mapped, &options)?;

    for path in [&columnar, &mapped] {
        let start = Instant::now();
        let file = MatrixFile::open(path)?;
        println!("\n{} opened in {:?}", path.display(), start.elapsed());
        println!("   Backend: {}", file.backend_kind());
        println!("   Shape: {}", file.shape());
        println!("   OMX version: {}", file.omx_version().unwrap_or("-"));
        for name in file.variable_names() {
            println!("   Variable {name}: {}", file.dtype_of(name)?);
        }
        for lookup in file.lookups().iter() {
            println!(
                "   Lookup {} ({} labels, axis {:?})",
                lookup.name(),
                lookup.len(),
                lookup.axis()
            );
        }

        let before = file.io_stats();
        let start = Instant::now();
        let slice = file.get(
            "DIST",
            &[
                Selection::labels([115, 100]),
                Selection::range(0, 4),
                Selection::labels(["PM"]),
            ],
        )?;
        let delta = file.io_stats().since(&before);
        println!("   DIST[orig 115,100; dest 0..4; PM] in {:?}:", start.elapsed());
        println!("{}", slice.values.as_typed::<f32>()?);
        println!(
            "   {} reads, {} row groups decoded, {} bytes",
            delta.reads, delta.row_groups_decoded, delta.bytes_read
        );

        if file.backend_kind() == BackendKind::Mapped {
            let points =
                file.get_points_many(&["DIST", "TIME"], &[vec![0, 24], vec![24, 0], vec![1, 1]])?;
            for (name, values) in &points.columns {
                println!("   {name} at (0,24,MD) and (24,0,MD): {values:?}");
            }
        }
        file.close();
    }
    Ok(())
}
