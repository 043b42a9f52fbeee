mod common;

use anyhow::Result;
use blobport_core::{ErrorKind, IOName, ServingSession, SessionOptions};
use blobport_engine::{write_net_to_binary_file, BlobProto, LayerParameter, NetParameter};
use blobport_session::BlobSession;

use common::*;

#[test]
fn classifier_grows_to_request_batch() -> Result<()> {
    let mut session = BlobSession::new(&classifier(), SessionOptions::default())?;
    assert_eq!(session.capacity(), 1);

    let input = ramp(&[4, 3, 224, 224]);
    let outputs = session.run(&[(IOName::from("data"), input)], &names(&["prob"]), &[])?;

    assert_eq!(session.capacity(), 4);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].shape().dims(), &[4, 1000]);

    // Untrained weights are zero, so every class is equally likely.
    let probs = outputs[0].to_f32_vec()?;
    assert!(probs.iter().all(|p| (p - 0.001).abs() < 1e-6));
    Ok(())
}

#[test]
fn linear_model_computes_per_row() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let weights = dir.path().join("linear.weights");
    write_net_to_binary_file(&linear_weights(), &weights)?;

    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let report = session.load_weights(&weights)?;
    assert_eq!(report.copied, vec!["fc".to_string()]);

    let input = tensor(&[3, 2], &[1.0, 1.0, 2.0, 0.0, 0.0, -1.0]);
    let outputs = session.run(&[(IOName::from("x"), input)], &names(&["score"]), &[])?;
    assert_eq!(outputs[0].shape().dims(), &[3, 2]);
    assert_eq!(
        outputs[0].to_f32_vec()?,
        vec![1.0, 3.0, 2.0, 1.0, 0.0, -1.0]
    );
    Ok(())
}

#[test]
fn capacity_is_monotonic_across_runs() -> Result<()> {
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let mut seen = session.capacity();
    for batch in [3usize, 2, 5, 1, 4] {
        let input = ramp(&[batch, 2]);
        let outputs = session.run(&[(IOName::from("x"), input)], &names(&["score"]), &[])?;
        assert_eq!(outputs[0].shape().leading(), Some(batch));
        seen = seen.max(batch);
        assert_eq!(session.capacity(), seen);
    }
    Ok(())
}

#[test]
fn smaller_batch_reads_only_its_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let weights = dir.path().join("linear.weights");
    write_net_to_binary_file(&linear_weights(), &weights)?;
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    session.load_weights(&weights)?;

    session.run(&[(IOName::from("x"), ramp(&[4, 2]))], &names(&["score"]), &[])?;
    let outputs = session.run(
        &[(IOName::from("x"), tensor(&[1, 2], &[5.0, 5.0]))],
        &names(&["score"]),
        &[],
    )?;
    assert_eq!(session.capacity(), 4);
    assert_eq!(outputs[0].shape().dims(), &[1, 2]);
    assert_eq!(outputs[0].to_f32_vec()?, vec![5.0, 11.0]);
    Ok(())
}

#[test]
fn explicit_reshape_is_idempotent() -> Result<()> {
    let mut session = BlobSession::new(&classifier(), SessionOptions::default())?;
    session.reshape(8)?;
    let shapes: Vec<Vec<usize>> = session
        .net()
        .blobs()
        .iter()
        .map(|b| b.shape().to_vec())
        .collect();

    session.reshape(8)?;
    assert_eq!(session.capacity(), 8);
    let again: Vec<Vec<usize>> = session
        .net()
        .blobs()
        .iter()
        .map(|b| b.shape().to_vec())
        .collect();
    assert_eq!(shapes, again);
    assert_eq!(session.spec().capacity, 8);
    assert_eq!(session.spec().inputs[0].dims[0], Some(8));

    let err = session.reshape(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn target_names_are_always_rejected() -> Result<()> {
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let err = session
        .run(
            &[(IOName::from("x"), ramp(&[1, 2]))],
            &names(&["score"]),
            &names(&["fc"]),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn too_few_inputs_are_rejected() -> Result<()> {
    let mut session = BlobSession::new(&two_inputs(), SessionOptions::default())?;

    let err = session.run(&[], &names(&["out_a"]), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = session
        .run(&[(IOName::from("a"), ramp(&[4, 2]))], &names(&["out_a"]), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("expected 2 inputs"));
    Ok(())
}

#[test]
fn first_input_needs_two_dimensions() -> Result<()> {
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let err = session
        .run(&[(IOName::from("x"), ramp(&[2]))], &names(&["score"]), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = session
        .run(&[(IOName::from("x"), tensor(&[0, 2], &[]))], &names(&["score"]), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn unknown_input_changes_nothing() -> Result<()> {
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let before = session.net().blobs().to_vec();

    let err = session
        .run(
            &[
                (IOName::from("x"), ramp(&[4, 2])),
                (IOName::from("image"), ramp(&[4, 2])),
            ],
            &names(&["score"]),
            &[],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("image"));
    assert_eq!(session.capacity(), 1);
    assert_eq!(session.net().blobs(), before.as_slice());
    Ok(())
}

#[test]
fn unknown_output_is_rejected() -> Result<()> {
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let err = session
        .run(&[(IOName::from("x"), ramp(&[1, 2]))], &names(&["logits"]), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("logits"));

    // Not fatal: the session keeps serving.
    session.run(&[(IOName::from("x"), ramp(&[1, 2]))], &names(&["score"]), &[])?;
    Ok(())
}

#[test]
fn mismatched_batch_sizes_are_rejected() -> Result<()> {
    let mut session = BlobSession::new(&two_inputs(), SessionOptions::default())?;
    let err = session
        .run(
            &[
                (IOName::from("a"), ramp(&[4, 2])),
                (IOName::from("b"), ramp(&[5, 3])),
            ],
            &names(&["out_a"]),
            &[],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("'b'"));
    Ok(())
}

#[test]
fn batch_is_taken_from_first_input_only() -> Result<()> {
    let mut session = BlobSession::new(&two_inputs(), SessionOptions::default())?;
    // Listing `b` first makes its leading dim the batch size for the call.
    let outputs = session.run(
        &[
            (IOName::from("b"), ramp(&[6, 3])),
            (IOName::from("a"), ramp(&[6, 2])),
        ],
        &names(&["out_b", "out_a"]),
        &[],
    )?;
    assert_eq!(session.capacity(), 6);
    assert_eq!(outputs[0].shape().dims(), &[6, 3]);
    assert_eq!(outputs[1].shape().dims(), &[6, 2]);
    Ok(())
}

#[test]
fn outputs_follow_requested_order() -> Result<()> {
    let mut session = BlobSession::new(&two_inputs(), SessionOptions::default())?;
    let inputs = [
        (IOName::from("a"), tensor(&[1, 2], &[-1.0, 2.0])),
        (IOName::from("b"), tensor(&[1, 3], &[0.0, 0.0, 0.0])),
    ];
    let outputs = session.run(&inputs, &names(&["out_b", "out_a", "out_b"]), &[])?;
    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs[0].to_f32_vec()?, vec![0.5, 0.5, 0.5]);
    assert_eq!(outputs[1].to_f32_vec()?, vec![0.0, 2.0]);
    assert_eq!(outputs[2].to_f32_vec()?, vec![0.5, 0.5, 0.5]);
    Ok(())
}

#[test]
fn higher_rank_outputs_come_back_flat() -> Result<()> {
    let topology = NetParameter::new("volume")
        .with_input("vol", &[2, 3, 4, 4])
        .with_layer(LayerParameter::new(
            "act",
            blobport_engine::LayerKind::TanH,
            &["vol"],
            &["act"],
        ));
    let mut session = BlobSession::new(&topology, SessionOptions::default())?;
    let input = ramp(&[2, 3, 4, 4]);
    let outputs = session.run(&[(IOName::from("vol"), input)], &names(&["act"]), &[])?;
    // Native rank is not restored: (2, 3, 4, 4) is returned as (2, 48).
    assert_eq!(outputs[0].shape().dims(), &[2, 48]);
    Ok(())
}

#[test]
fn short_payload_is_rejected_before_copy() -> Result<()> {
    let mut session = BlobSession::new(&two_inputs(), SessionOptions::default())?;
    let before = session.net().blobs().to_vec();

    // Declares two rows of `a` but carries only one.
    let err = session
        .run(
            &[
                (IOName::from("a"), tensor(&[2, 2], &[1.0, 2.0])),
                (IOName::from("b"), ramp(&[2, 3])),
            ],
            &names(&["out_a"]),
            &[],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.message().contains("'a'"));
    assert_eq!(session.net().blobs(), before.as_slice());
    Ok(())
}

#[test]
fn huge_declared_batch_is_rejected_without_growth() -> Result<()> {
    let mut session = BlobSession::new(&two_inputs(), SessionOptions::default())?;
    let err = session
        .run(
            &[
                (IOName::from("a"), tensor(&[usize::MAX / 2, 2], &[1.0, 2.0])),
                (IOName::from("b"), ramp(&[1, 3])),
            ],
            &names(&["out_a"]),
            &[],
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.capacity(), 4);

    let err = session.reshape(usize::MAX / 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.capacity(), 4);

    // Neither failure is fatal.
    session.run(
        &[
            (IOName::from("a"), ramp(&[1, 2])),
            (IOName::from("b"), ramp(&[1, 3])),
        ],
        &names(&["out_a"]),
        &[],
    )?;
    Ok(())
}

#[test]
fn oversized_input_is_rejected_before_copy() -> Result<()> {
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    // Leading dim matches, trailing dims do not fit the (batch, 2) buffer.
    let err = session
        .run(&[(IOName::from("x"), ramp(&[2, 5]))], &names(&["score"]), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn missing_weight_file_is_invalid_and_harmless() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let good = dir.path().join("linear.weights");
    write_net_to_binary_file(&linear_weights(), &good)?;
    session.load_weights(&good)?;
    let before = session.net().layer_by_name("fc").map(|l| l.params().to_vec());

    let err = session
        .load_weights(dir.path().join("missing.weights"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let garbage = dir.path().join("garbage.weights");
    std::fs::write(&garbage, [0xffu8, 0xff, 0xff])?;
    let err = session.load_weights(&garbage).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(
        session.net().layer_by_name("fc").map(|l| l.params().to_vec()),
        before
    );
    session.run(&[(IOName::from("x"), ramp(&[1, 2]))], &names(&["score"]), &[])?;
    Ok(())
}

#[test]
fn mismatched_weight_shapes_poison_the_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let bad = dir.path().join("bad.weights");
    let weights = NetParameter::new("linear").with_layer(
        LayerParameter::inner_product("fc", "x", "score", 2).with_blobs(vec![
            BlobProto::new(&[2, 3], vec![0.0; 6]),
            BlobProto::new(&[2], vec![0.0; 2]),
        ]),
    );
    write_net_to_binary_file(&weights, &bad)?;

    let mut session = BlobSession::new(&linear(), SessionOptions::default())?;
    let err = session.load_weights(&bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);

    let err = session
        .run(&[(IOName::from("x"), ramp(&[1, 2]))], &names(&["score"]), &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fatal);
    Ok(())
}

#[test]
fn broken_topology_aborts_construction() {
    let topology = NetParameter::new("broken")
        .with_input("x", &[1, 2])
        .with_layer(LayerParameter::inner_product("fc", "nowhere", "score", 2));
    let err = BlobSession::new(&topology, SessionOptions::default())
        .err()
        .expect("construction must fail");
    assert_eq!(err.kind(), ErrorKind::Fatal);
}

#[test]
fn drives_through_the_trait_object() -> Result<()> {
    let session = BlobSession::new(&linear(), SessionOptions::default())?;
    let mut boxed: Box<dyn ServingSession> = Box::new(session);
    boxed.reshape(3)?;
    assert_eq!(boxed.spec().capacity, 3);
    assert_eq!(boxed.spec().outputs[0].name, IOName::from("score"));
    let outputs = boxed.run(&[(IOName::from("x"), ramp(&[2, 2]))], &names(&["score"]), &[])?;
    assert_eq!(outputs[0].shape().dims(), &[2, 2]);
    Ok(())
}

#[test]
fn topology_file_loads() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("linear.net");
    write_net_to_binary_file(&linear(), &path)?;
    let session = BlobSession::from_file(&path, SessionOptions::default())?;
    assert_eq!(session.bindings().input("x"), Some(0));

    let missing = BlobSession::from_file(dir.path().join("none.net"), SessionOptions::default());
    assert_eq!(
        missing.err().map(|e| e.kind()),
        Some(ErrorKind::InvalidArgument)
    );
    Ok(())
}
