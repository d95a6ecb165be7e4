mod common;

use amx::{
    AmxError, AxisLabels, BackendKind, DType, Label, MatrixFile, MatrixWriter, OpenOptions,
    Selection, Shape, WriteOptions, OMX_VERSION,
};
use common::{int_labels, sequential, write, write_and_open};
use ndarray::{array, ArrayD, IxDyn};
use rstest::rstest;

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_end_to_end_small_skim(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MatrixWriter::new(Shape::new(vec![3, 3]).unwrap());
    writer.add_variable("D", (0..9).collect::<Vec<i32>>()).unwrap();
    let file = write_and_open(dir.path(), kind, &writer, &WriteOptions::default());

    assert_eq!(file.backend_kind(), kind);
    assert_eq!(file.list_matrices(), vec!["D"]);
    assert_eq!(file.dtype_of("D").unwrap(), DType::I32);
    assert_eq!(file.omx_version(), Some(OMX_VERSION));
    assert_eq!(file.ndim(), 2);

    let slice = file
        .get("D", &[Selection::indices([1]), Selection::indices([0, 2])])
        .unwrap();
    assert_eq!(slice.shape(), &[1, 2]);
    assert_eq!(slice.into_typed::<i32>().unwrap(), array![[3, 5]].into_dyn());
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_selection_order_preserved(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let file = write_and_open(dir.path(), kind, &sequential(&[5], &["x"]), &WriteOptions::default());

    let values = file
        .get("x", &[Selection::indices([3, 1, 2])])
        .unwrap()
        .into_typed::<f64>()
        .unwrap();
    assert_eq!(values.as_slice().unwrap(), &[3.0, 1.0, 2.0]);
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_scalar_axes_dropped(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let file = write_and_open(dir.path(), kind, &sequential(&[5, 4], &["x"]), &WriteOptions::default());

    let point = file
        .get("x", &[Selection::Index(2), Selection::Index(3)])
        .unwrap();
    assert!(point.shape().is_empty());
    assert_eq!(point.index, Some(vec![]));
    assert_eq!(point.into_typed::<f64>().unwrap()[IxDyn(&[])], 11.0);

    let row = file.get("x", &[Selection::Index(1)]).unwrap();
    assert_eq!(row.shape(), &[4]);
    assert_eq!(
        row.into_typed::<f64>().unwrap().as_slice().unwrap(),
        &[4.0, 5.0, 6.0, 7.0]
    );
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_three_dimensional(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let file = write_and_open(
        dir.path(),
        kind,
        &sequential(&[2, 3, 4], &["x"]),
        &WriteOptions::default(),
    );

    let values = file
        .get(
            "x",
            &[
                Selection::indices([1, 0]),
                Selection::Index(2),
                Selection::indices([3, 0]),
            ],
        )
        .unwrap()
        .into_typed::<f64>()
        .unwrap();
    assert_eq!(values, array![[23.0, 20.0], [11.0, 8.0]].into_dyn());

    let whole = file.get_matrix("x").unwrap().into_typed::<f64>().unwrap();
    assert_eq!(whole.shape(), &[2, 3, 4]);
    assert_eq!(whole[[1, 2, 3]], 23.0);
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_zero_size_selection(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let file = write_and_open(dir.path(), kind, &sequential(&[4, 4], &["x"]), &WriteOptions::default());

    let before = file.io_stats();
    let slice = file
        .get("x", &[Selection::Indices(vec![]), Selection::All])
        .unwrap();
    assert_eq!(slice.shape(), &[0, 4]);
    assert!(slice.values.is_empty());
    assert_eq!(file.io_stats().since(&before).reads, 0);

    let empty_range = file.get("x", &[Selection::All, Selection::range(2, 2)]).unwrap();
    assert_eq!(empty_range.shape(), &[4, 0]);
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_label_selection_matches_positions(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let zones = [101, 102, 205, 150];
    let mut writer = sequential(&[4, 4], &["time"]);
    writer
        .add_lookup("orig", int_labels(&zones), Some(0))
        .unwrap()
        .add_lookup("dest", int_labels(&zones), Some(1))
        .unwrap()
        .add_lookup(
            "names",
            ["a", "b", "c", "d"].into_iter().map(Label::from).collect(),
            None,
        )
        .unwrap();
    let file = write_and_open(dir.path(), kind, &writer, &WriteOptions::default());
    assert_eq!(file.lookups().names(), vec!["dest", "names", "orig"]);

    let by_label = file
        .get(
            "time",
            &[Selection::labels([205, 101]), Selection::labels([150])],
        )
        .unwrap();
    let by_position = file
        .get("time", &[Selection::indices([2, 0]), Selection::indices([3])])
        .unwrap();
    assert_eq!(by_label.values, by_position.values);
    assert_eq!(
        by_label.into_typed::<f64>().unwrap(),
        array![[11.0], [3.0]].into_dyn()
    );

    // labels and positions mix across axes, and named lookups work anywhere
    let mixed = file
        .get(
            "time",
            &[Selection::labels_in("names", ["d"]), Selection::indices([0, 1])],
        )
        .unwrap();
    assert_eq!(
        mixed.values.into_typed::<f64>().unwrap(),
        array![[12.0, 13.0]].into_dyn()
    );

    let index = by_position.index.unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index[0].lookup.as_deref(), Some("orig"));
    assert_eq!(index[0].labels, AxisLabels::Labels(int_labels(&[205, 101])));
    assert_eq!(index[1].labels, AxisLabels::Labels(int_labels(&[150])));
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_points_match_crossed_diagonal(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let file = write_and_open(
        dir.path(),
        kind,
        &sequential(&[10, 10], &["a", "b"]),
        &WriteOptions::default(),
    );

    let rows = vec![1, 2, 3, 4, 8, 6];
    let cols = vec![9, 7, 5, 6, 3, 0];
    let points = file.get_points("a", &[rows.clone(), cols.clone()]).unwrap();
    let points = points.into_typed::<f64>().unwrap();
    assert_eq!(
        points.as_slice().unwrap(),
        &[19.0, 27.0, 35.0, 46.0, 83.0, 60.0]
    );

    let crossed = file
        .get_with(
            "a",
            &[Selection::Indices(rows.clone()), Selection::Indices(cols.clone())],
            false,
        )
        .unwrap()
        .into_typed::<f64>()
        .unwrap();
    for k in 0..rows.len() {
        assert_eq!(points[[k]], crossed[[k, k]]);
    }

    let table = file.get_points_many(&["b", "a"], &[rows, cols]).unwrap();
    assert_eq!(table.num_points(), 6);
    assert_eq!(table.index.len(), 2);
    assert_eq!(table.index[1].labels, AxisLabels::Positions(vec![9, 7, 5, 6, 3, 0]));
    assert_eq!(table.columns[0].0, "b");
    let b = table.column("b").unwrap().as_typed::<f64>().unwrap();
    assert_eq!(b[[0]], 1019.0);
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_selection_errors(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = sequential(&[3, 4], &["x"]);
    writer.add_lookup("rows", int_labels(&[7, 8, 9]), Some(0)).unwrap();
    let file = write_and_open(dir.path(), kind, &writer, &WriteOptions::default());

    assert!(matches!(
        file.get("y", &[]),
        Err(AmxError::UnknownVariable(name)) if name == "y"
    ));
    assert!(matches!(
        file.get("x", &[Selection::All, Selection::indices([4])]),
        Err(AmxError::IndexOutOfBounds { axis: 1, index: 4, bound: 4 })
    ));
    assert!(matches!(
        file.get("x", &[Selection::indices([-1])]),
        Err(AmxError::IndexOutOfBounds { axis: 0, index: -1, .. })
    ));
    assert!(matches!(
        file.get("x", &[Selection::labels([6])]),
        Err(AmxError::UnknownLabel { .. })
    ));
    assert!(matches!(
        file.get("x", &[Selection::All, Selection::labels([7])]),
        Err(AmxError::UnknownLookup(_))
    ));
    assert!(matches!(
        file.get("x", &[Selection::All, Selection::All, Selection::All]),
        Err(AmxError::TooManySelections { given: 3, ndim: 2 })
    ));
    assert!(matches!(
        file.get_points("x", &[vec![0, 1], vec![0]]),
        Err(AmxError::InvalidSelection(_))
    ));
    assert!(matches!(
        file.get_matrix("x").unwrap().into_typed::<f32>(),
        Err(AmxError::DTypeMismatch {
            stored: DType::F64,
            requested: DType::F32
        })
    ));
}

#[test]
fn test_open_without_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = sequential(&[3], &["x"]);
    writer.add_lookup("zones", int_labels(&[5, 6, 7]), Some(0)).unwrap();
    let path = write(dir.path(), BackendKind::Columnar, &writer, &WriteOptions::default());

    let file = MatrixFile::open_with(&path, OpenOptions::default().without_lookups()).unwrap();
    assert!(file.lookups().is_empty());
    assert!(matches!(
        file.get("x", &[Selection::labels([6])]),
        Err(AmxError::UnknownLookup(_))
    ));

    let slice = file.get("x", &[Selection::indices([2])]).unwrap();
    assert_eq!(
        slice.index.unwrap()[0].labels,
        AxisLabels::Positions(vec![2])
    );
}

#[test]
fn test_open_rejects_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skims.omx");
    std::fs::write(&path, b"\x89HDF\r\n\x1a\n").unwrap();
    assert!(matches!(MatrixFile::open(&path), Err(AmxError::UnknownFormat)));

    let parquet = write(
        dir.path(),
        BackendKind::Columnar,
        &sequential(&[2], &["x"]),
        &WriteOptions::default(),
    );
    let forced = MatrixFile::open_with(&parquet, OpenOptions::default().with_format(BackendKind::Mapped));
    assert!(matches!(forced, Err(AmxError::BackendIo { .. })));
}

#[test]
fn test_typed_values_round_trip_every_dtype() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MatrixWriter::new(Shape::new(vec![2, 2]).unwrap());
    writer
        .add_variable("i8", vec![-1i8, 2, -3, 4])
        .unwrap()
        .add_variable("u64", vec![u64::MAX, 0, 1, 2])
        .unwrap()
        .add_variable("f32", vec![0.5f32, 1.5, 2.5, 3.5])
        .unwrap();

    for kind in [BackendKind::Columnar, BackendKind::Mapped] {
        let sub = dir.path().join(kind.to_string());
        std::fs::create_dir(&sub).unwrap();
        let file = write_and_open(&sub, kind, &writer, &WriteOptions::default());
        let i8s: ArrayD<i8> = file.get_matrix("i8").unwrap().into_typed().unwrap();
        assert_eq!(i8s, array![[-1i8, 2], [-3, 4]].into_dyn());
        let u64s: ArrayD<u64> = file.get_matrix("u64").unwrap().into_typed().unwrap();
        assert_eq!(u64s[[0, 0]], u64::MAX);
        assert_eq!(file.dtype_of("f32").unwrap(), DType::F32);
        file.close();
    }
}

/// Container written by hand whose single column disagrees with its SHAPE
fn write_mismatched(dir: &std::path::Path, kind: BackendKind) -> std::path::PathBuf {
    use std::collections::HashMap;
    use std::sync::Arc;

    use arrow_array::{ArrayRef, Float32Array, RecordBatch};
    use arrow_schema::{DataType, Field, Schema};

    let metadata = HashMap::from([("SHAPE".to_string(), "(25, 25, 3)".to_string())]);
    let schema = Arc::new(
        Schema::new(vec![Field::new("DIST", DataType::Float32, false)]).with_metadata(metadata),
    );
    let column: ArrayRef = Arc::new(Float32Array::from_iter_values((0..625).map(|v| v as f32)));
    let batch = RecordBatch::try_new(schema.clone(), vec![column]).unwrap();

    match kind {
        BackendKind::Columnar => {
            let path = dir.join("skims.parquet");
            let file = std::fs::File::create(&path).unwrap();
            let mut writer = parquet::arrow::ArrowWriter::try_new(file, schema, None).unwrap();
            writer.write(&batch).unwrap();
            writer.close().unwrap();
            path
        }
        BackendKind::Mapped => {
            let path = dir.join("skims.arrow");
            let file = std::fs::File::create(&path).unwrap();
            let mut writer = arrow_ipc::writer::FileWriter::try_new(file, &schema).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
            path
        }
    }
}

#[rstest]
#[case::columnar(BackendKind::Columnar)]
#[case::mapped(BackendKind::Mapped)]
fn test_open_rejects_column_shorter_than_shape(#[case] kind: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_mismatched(dir.path(), kind);

    let err = MatrixFile::open(&path).unwrap_err();
    assert!(
        matches!(
            &err,
            AmxError::ShapeMismatch { variable, actual: 625, expected: 1875 } if variable == "DIST"
        ),
        "{err}"
    );
    assert_eq!(err.category(), amx::ErrorCategory::Format);
}
