//! End-to-end tests of the update state machine: metadata plus chunked
//! column data in, one diff per update out.

use ticktable_client::{
    ArrayColumnSource, CellValue, ClientError, ColumnSource, DataType, RowSequence,
    RowSequenceBuilder, TableSnapshot, UpdateProcessor,
};
use ticktable_protocol::{UpdateMetadata, encode_compressed_delta};

fn encode_rows(rows: &RowSequence) -> Vec<u8> {
    let mut bytes = Vec::new();
    encode_compressed_delta(&mut bytes, rows).unwrap();
    bytes
}

/// Build the framed metadata bytes for one update.
fn metadata_bytes(
    removed: &RowSequence,
    shifts: &[(u64, u64, u64)],
    added: &RowSequence,
    modifies: &[RowSequence],
) -> Vec<u8> {
    let shift_first = RowSequence::from_keys(shifts.iter().map(|t| t.0));
    let shift_last = RowSequence::from_keys(shifts.iter().map(|t| t.1));
    let shift_dest = RowSequence::from_keys(shifts.iter().map(|t| t.2));
    let mut shift_data = encode_rows(&shift_first);
    shift_data.extend(encode_rows(&shift_last));
    shift_data.extend(encode_rows(&shift_dest));

    let metadata = UpdateMetadata {
        first_seq: 0,
        last_seq: 0,
        is_snapshot: false,
        viewport: None,
        removed_rows: encode_rows(removed),
        shift_data,
        added_rows: encode_rows(added),
        mod_column_rows: modifies.iter().map(encode_rows).collect(),
    };
    metadata.to_wrapped_bytes().unwrap()
}

fn keys_of(rows: &RowSequence) -> Vec<u64> {
    rows.keys().collect()
}

fn text_cells(snapshot: &TableSnapshot) -> Vec<CellValue> {
    (0..snapshot.num_rows() as usize)
        .map(|row| snapshot.cell(0, row))
        .collect()
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

/// Drive one text column's worth of added rows through in a single call.
fn add_rows(processor: &mut UpdateProcessor, keys: &[u64], values: &[&str]) -> RowSequence {
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::from_keys(keys.iter().copied()),
        &[],
    );
    let source = ArrayColumnSource::text(values.iter().copied().map(Some));
    let update = processor
        .process_next_chunk(&[&source as &dyn ColumnSource], &[values.len()], Some(&metadata))
        .unwrap()
        .expect("update should complete in one call");
    update.added_rows().clone()
}

#[test]
fn test_round_trip_add_erase_refill() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);

    // Start from empty: add keys {10, 20, 30} with values a, b, c.
    let added = add_rows(&mut processor, &[10, 20, 30], &["a", "b", "c"]);
    assert_eq!(keys_of(&added), vec![0, 1, 2]);

    // Erase key 20: the diff reports removed position 1.
    let metadata = metadata_bytes(
        &RowSequence::single(20),
        &[],
        &RowSequence::empty(),
        &[],
    );
    let update = processor
        .process_next_chunk(&[], &[], Some(&metadata))
        .unwrap()
        .expect("remove-only update completes immediately");
    assert_eq!(keys_of(update.removed_rows()), vec![1]);
    assert_eq!(update.prev().num_rows(), 3);
    assert_eq!(update.after_modifies().num_rows(), 2);
    assert_eq!(text_cells(update.after_modifies()), vec![text("a"), text("c")]);

    // Key 25 fills the vacated middle position.
    let added = add_rows(&mut processor, &[25], &["z"]);
    assert_eq!(keys_of(&added), vec![1]);
}

#[test]
fn test_snapshots_and_phase_identity() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    add_rows(&mut processor, &[1, 2], &["a", "b"]);

    // An update with adds but no removes and no modifies: the untouched
    // phase boundaries are identity snapshots.
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::single(3),
        &[],
    );
    let source = ArrayColumnSource::text([Some("c")]);
    let update = processor
        .process_next_chunk(&[&source as &dyn ColumnSource], &[1], Some(&metadata))
        .unwrap()
        .unwrap();

    assert!(update.prev().ptr_eq(update.after_removes()));
    assert!(!update.after_removes().ptr_eq(update.after_adds()));
    assert!(update.after_adds().ptr_eq(update.after_modifies()));

    assert_eq!(text_cells(update.prev()), vec![text("a"), text("b")]);
    assert_eq!(text_cells(update.after_modifies()), vec![
        text("a"),
        text("b"),
        text("c")
    ]);
}

#[test]
fn test_update_with_all_four_change_kinds() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    add_rows(&mut processor, &[0, 1, 2], &["x0", "x1", "x2"]);

    // One update that removes key 0, shifts [1,2] up to [11,12], adds
    // key 5, and modifies (new) key 12. Processing order must be
    // removes, shifts, adds, modifies.
    let metadata = metadata_bytes(
        &RowSequence::single(0),
        &[(1, 2, 11)],
        &RowSequence::single(5),
        &[RowSequence::single(12)],
    );

    // First call carries the metadata and the added row.
    let add_source = ArrayColumnSource::text([Some("n0")]);
    let pending = processor
        .process_next_chunk(&[&add_source as &dyn ColumnSource], &[1], Some(&metadata))
        .unwrap();
    assert!(pending.is_none(), "modify data is still outstanding");

    // Second call carries the modified row.
    let mod_source = ArrayColumnSource::text([Some("m2")]);
    let update = processor
        .process_next_chunk(&[&mod_source as &dyn ColumnSource], &[1], None)
        .unwrap()
        .expect("update completes once modifies arrive");

    assert_eq!(text_cells(update.prev()), vec![text("x0"), text("x1"), text("x2")]);
    assert_eq!(keys_of(update.removed_rows()), vec![0]);
    assert_eq!(text_cells(update.after_removes()), vec![text("x1"), text("x2")]);
    assert_eq!(keys_of(update.added_rows()), vec![0]);
    assert_eq!(text_cells(update.after_adds()), vec![
        text("n0"),
        text("x1"),
        text("x2")
    ]);
    assert_eq!(update.modified_rows().len(), 1);
    assert_eq!(keys_of(&update.modified_rows()[0]), vec![2]);
    assert_eq!(text_cells(update.after_modifies()), vec![
        text("n0"),
        text("x1"),
        text("m2")
    ]);

    // Every snapshot keeps columns and index in lockstep.
    for snapshot in [
        update.prev(),
        update.after_removes(),
        update.after_adds(),
        update.after_modifies(),
    ] {
        assert_eq!(snapshot.column(0).len() as u64, snapshot.num_rows());
    }
}

#[test]
fn test_wrong_ordering_would_differ() {
    // The same update applied adds-before-removes is not merely a
    // different result: re-adding a key the remove should have cleared
    // first is a bookkeeping defect.
    use ticktable_client::TableState;

    let mut correct = TableState::new(&[DataType::Text]);
    let keys = RowSequence::from_keys([0, 1]);
    let positions = correct.add_keys(&keys).unwrap();
    let source = ArrayColumnSource::text([Some("x0"), Some("x1")]);
    correct
        .add_data(&[&source as &dyn ColumnSource], &[0], &[2], &positions)
        .unwrap();
    let mut wrong = correct.clone();

    // removes {1} then adds {1}: legal, row 1 is replaced.
    correct.erase(&RowSequence::single(1)).unwrap();
    let positions = correct.add_keys(&RowSequence::single(1)).unwrap();
    let replacement = ArrayColumnSource::text([Some("new")]);
    correct
        .add_data(&[&replacement as &dyn ColumnSource], &[0], &[1], &positions)
        .unwrap();

    // adds {1} before removes {1}: the add hits a live key.
    let err = wrong.add_keys(&RowSequence::single(1)).unwrap_err();
    assert!(matches!(err, ClientError::KeyAlreadyPresent(1)));
}

#[test]
fn test_chunked_delivery_matches_single_shot() {
    let keys: Vec<u64> = (100..106).collect();
    let values = ["v0", "v1", "v2", "v3", "v4", "v5"];
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::from_keys(keys.iter().copied()),
        &[],
    );

    // Single shot.
    let mut one_shot = UpdateProcessor::new(&[DataType::Text]);
    let source = ArrayColumnSource::text(values.iter().copied().map(Some));
    let expected = one_shot
        .process_next_chunk(&[&source as &dyn ColumnSource], &[6], Some(&metadata))
        .unwrap()
        .unwrap();

    // Same rows split 2 + 1 + 3 across calls.
    let mut chunked = UpdateProcessor::new(&[DataType::Text]);
    let mut result = None;
    let mut fed = 0usize;
    for chunk_len in [2usize, 1, 3] {
        let chunk_values = &values[fed..fed + chunk_len];
        let source = ArrayColumnSource::text(chunk_values.iter().copied().map(Some));
        let maybe = chunked
            .process_next_chunk(
                &[&source as &dyn ColumnSource],
                &[chunk_len],
                if fed == 0 { Some(&metadata) } else { None },
            )
            .unwrap();
        fed += chunk_len;
        if fed < values.len() {
            assert!(maybe.is_none(), "update must not complete early");
        } else {
            result = maybe;
        }
    }
    let chunked_update = result.expect("update completes with the final chunk");

    assert_eq!(
        keys_of(expected.added_rows()),
        keys_of(chunked_update.added_rows())
    );
    assert_eq!(
        text_cells(expected.after_modifies()),
        text_cells(chunked_update.after_modifies())
    );
}

#[test]
fn test_chunked_modifies_per_column_independent() {
    let mut processor = UpdateProcessor::new(&[DataType::Text, DataType::Int64]);

    // Seed two columns, three rows.
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::from_keys([1, 2, 3]),
        &[],
    );
    let texts = ArrayColumnSource::text([Some("a"), Some("b"), Some("c")]);
    let numbers = ArrayColumnSource::int64([Some(10), Some(20), Some(30)]);
    processor
        .process_next_chunk(
            &[&texts as &dyn ColumnSource, &numbers as &dyn ColumnSource],
            &[3, 3],
            Some(&metadata),
        )
        .unwrap()
        .unwrap();

    // Column 0 modifies one row; column 1 modifies all three.
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::empty(),
        &[RowSequence::single(2), RowSequence::from_keys([1, 2, 3])],
    );
    let text_mod = ArrayColumnSource::text([Some("B")]);
    let num_mod_first = ArrayColumnSource::int64([Some(11), Some(21)]);
    let pending = processor
        .process_next_chunk(
            &[
                &text_mod as &dyn ColumnSource,
                &num_mod_first as &dyn ColumnSource,
            ],
            &[1, 2],
            Some(&metadata),
        )
        .unwrap();
    assert!(pending.is_none(), "column 1 still has a row outstanding");

    // Column 0 is done; only column 1 delivers in the second call.
    let text_empty = ArrayColumnSource::text(std::iter::empty::<Option<&str>>());
    let num_mod_rest = ArrayColumnSource::int64([Some(31)]);
    let update = processor
        .process_next_chunk(
            &[
                &text_empty as &dyn ColumnSource,
                &num_mod_rest as &dyn ColumnSource,
            ],
            &[0, 1],
            None,
        )
        .unwrap()
        .expect("update completes when the last column drains");

    assert_eq!(keys_of(&update.modified_rows()[0]), vec![1]);
    assert_eq!(keys_of(&update.modified_rows()[1]), vec![0, 1, 2]);
    let current = update.after_modifies();
    assert_eq!(current.cell(0, 1), text("B"));
    assert_eq!(current.cell(1, 0), CellValue::Int64(11));
    assert_eq!(current.cell(1, 1), CellValue::Int64(21));
    assert_eq!(current.cell(1, 2), CellValue::Int64(31));
}

#[test]
fn test_shift_changes_keys_not_positions() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    add_rows(&mut processor, &[100, 101, 102], &["a", "b", "c"]);

    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[(100, 102, 200)],
        &RowSequence::empty(),
        &[],
    );
    let update = processor
        .process_next_chunk(&[], &[], Some(&metadata))
        .unwrap()
        .unwrap();

    // Row data is untouched and stays in position order.
    assert_eq!(text_cells(update.after_modifies()), vec![
        text("a"),
        text("b"),
        text("c")
    ]);
    assert!(update.removed_rows().is_empty());
    assert!(update.added_rows().is_empty());

    // The next update can address the rows by their new keys.
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::empty(),
        &[RowSequence::single(201)],
    );
    let modified = ArrayColumnSource::text([Some("B")]);
    let update = processor
        .process_next_chunk(&[&modified as &dyn ColumnSource], &[1], Some(&metadata))
        .unwrap()
        .unwrap();
    assert_eq!(keys_of(&update.modified_rows()[0]), vec![1]);
    assert_eq!(text_cells(update.after_modifies()), vec![
        text("a"),
        text("B"),
        text("c")
    ]);
}

#[test]
fn test_missing_metadata_is_fatal() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    let err = processor.process_next_chunk(&[], &[], None).unwrap_err();
    assert!(matches!(err, ClientError::MetadataRequired));

    // After a fatal error the processor refuses further work.
    let err = processor.process_next_chunk(&[], &[], None).unwrap_err();
    assert!(matches!(err, ClientError::SubscriptionFailed));
}

#[test]
fn test_excess_add_data_is_fatal() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::single(7),
        &[],
    );
    let source = ArrayColumnSource::text([Some("a"), Some("b")]);
    let err = processor
        .process_next_chunk(&[&source as &dyn ColumnSource], &[2], Some(&metadata))
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::ExcessAddData {
            supplied: 2,
            outstanding: 1
        }
    ));
}

#[test]
fn test_leftover_data_is_fatal() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    // Remove-only update: no column data is expected at all.
    add_rows(&mut processor, &[1], &["a"]);
    let metadata = metadata_bytes(
        &RowSequence::single(1),
        &[],
        &RowSequence::empty(),
        &[],
    );
    let source = ArrayColumnSource::text([Some("junk")]);
    let err = processor
        .process_next_chunk(&[&source as &dyn ColumnSource], &[1], Some(&metadata))
        .unwrap_err();
    assert!(matches!(err, ClientError::LeftoverData));
}

#[test]
fn test_bad_magic_is_fatal() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);
    let mut metadata = metadata_bytes(
        &RowSequence::empty(),
        &[],
        &RowSequence::empty(),
        &[],
    );
    metadata[0] ^= 0xFF;
    let err = processor
        .process_next_chunk(&[], &[], Some(&metadata))
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_cardinality_conserved_across_update_sequence() {
    let mut processor = UpdateProcessor::new(&[DataType::Text]);

    let check = |update: &ticktable_client::TickingUpdate| {
        let snapshot = update.after_modifies();
        for col in 0..snapshot.num_columns() {
            assert_eq!(snapshot.column(col).len() as u64, snapshot.num_rows());
        }
    };

    add_rows(&mut processor, &[0, 1, 2, 3, 4], &["a", "b", "c", "d", "e"]);

    // remove two, shift the tail down, add one in the gap
    let metadata = metadata_bytes(
        &RowSequence::from_keys([1, 3]),
        &[(4, 4, 1)],
        &RowSequence::single(3),
        &[],
    );
    let source = ArrayColumnSource::text([Some("f")]);
    let update = processor
        .process_next_chunk(&[&source as &dyn ColumnSource], &[1], Some(&metadata))
        .unwrap()
        .unwrap();
    check(&update);
    assert_eq!(update.after_modifies().num_rows(), 4);

    // pure shift
    let metadata = metadata_bytes(
        &RowSequence::empty(),
        &[(0, 3, 10)],
        &RowSequence::empty(),
        &[],
    );
    let update = processor
        .process_next_chunk(&[], &[], Some(&metadata))
        .unwrap()
        .unwrap();
    check(&update);
    assert_eq!(update.after_modifies().num_rows(), 4);
}

#[test]
fn test_builder_and_sequence_agree_on_span_forms() {
    // Sanity check that span-built and key-built sequences feed the
    // metadata encoder identically.
    let mut builder = RowSequenceBuilder::new();
    builder.add_span(10, 13);
    let from_spans = builder.build();
    let from_keys = RowSequence::from_keys([10, 11, 12]);
    assert_eq!(encode_rows(&from_spans), encode_rows(&from_keys));
}
