#![allow(dead_code)]

use std::path::{Path, PathBuf};

use amx::{BackendKind, Label, MatrixFile, MatrixWriter, Shape, WriteOptions};

/// Write `writer` into `dir` in the given sub-format and open it
pub fn write_and_open(
    dir: &Path,
    kind: BackendKind,
    writer: &MatrixWriter,
    options: &WriteOptions,
) -> MatrixFile {
    let path = write(dir, kind, writer, options);
    MatrixFile::open(&path).unwrap()
}

pub fn write(dir: &Path, kind: BackendKind, writer: &MatrixWriter, options: &WriteOptions) -> PathBuf {
    let path = match kind {
        BackendKind::Columnar => dir.join("skims.parquet"),
        BackendKind::Mapped => dir.join("skims.arrow"),
    };
    match kind {
        BackendKind::Columnar => writer.write_columnar(&path, options).unwrap(),
        BackendKind::Mapped => writer.write_mapped(&path, options).unwrap(),
    }
    path
}

/// Writer holding `count` consecutive values starting at zero for each name
pub fn sequential(dims: &[usize], names: &[&str]) -> MatrixWriter {
    let shape = Shape::new(dims.to_vec()).unwrap();
    let count = shape.num_elements();
    let mut writer = MatrixWriter::new(shape);
    for (k, name) in names.iter().enumerate() {
        let values: Vec<f64> = (0..count).map(|v| (v + k * 1000) as f64).collect();
        writer.add_variable(*name, values).unwrap();
    }
    writer
}

pub fn int_labels(values: &[i64]) -> Vec<Label> {
    values.iter().copied().map(Label::Int).collect()
}
