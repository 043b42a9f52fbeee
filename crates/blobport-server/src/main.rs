mod cli;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use blobport_core::{BatchingConfig, IOName, ServingSession, SessionOptions, Shape, Tensor};
use blobport_runtime::{BatchPolicy, InferenceRequest, Pipeline};
use blobport_session::{init_execution_mode, BlobSession, EngineProbe};
use clap::Parser;
use cli::{Cli, Command, ModelArgs};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut options = SessionOptions::default();
    if let Some(gpus) = cli.gpus {
        options = options.with_device_count("gpu", gpus);
    }
    // Fixed once, before any session exists.
    init_execution_mode(&EngineProbe, &options);

    match cli.command {
        Command::Info { model } => info(&model, options),
        Command::Bench {
            model,
            batch,
            requests,
            workers,
            max_batch,
            max_delay_ms,
            prewarm,
        } => {
            let options = options.with_batching(BatchingConfig {
                max_batch,
                max_delay: Duration::from_millis(max_delay_ms),
            });
            bench(&model, options, batch, requests, workers, prewarm).await
        }
    }
}

fn load(model: &ModelArgs, options: SessionOptions) -> Result<BlobSession> {
    let mut session = BlobSession::from_file(&model.topology, options)
        .with_context(|| format!("failed to load {}", model.topology.display()))?;
    if let Some(weights) = &model.weights {
        session
            .load_weights(weights)
            .with_context(|| format!("failed to load weights {}", weights.display()))?;
    }
    Ok(session)
}

fn info(model: &ModelArgs, options: SessionOptions) -> Result<()> {
    let session = load(model, options)?;
    let spec = session.spec();
    println!("network: {}", spec.name);
    println!("batch capacity: {}", spec.capacity);
    for input in &spec.inputs {
        println!("  input  {:<24} {:?}", input.name, input.dims);
    }
    for output in &spec.outputs {
        println!("  output {:<24} {:?}", output.name, output.dims);
    }
    Ok(())
}

async fn bench(
    model: &ModelArgs,
    options: SessionOptions,
    batch: usize,
    requests: usize,
    workers: usize,
    prewarm: bool,
) -> Result<()> {
    anyhow::ensure!(batch >= 1, "--batch must be at least 1");
    let batching = options.batching.clone().unwrap_or_default();

    let mut sessions: Vec<Box<dyn ServingSession>> = Vec::with_capacity(workers.max(1));
    for _ in 0..workers.max(1) {
        let mut session = load(model, options.clone())?;
        if prewarm {
            session.reshape(batching.max_batch.max(batch))?;
        }
        sessions.push(Box::new(session));
    }

    let spec = sessions[0].spec().clone();
    let output_names: Vec<IOName> = spec.outputs.iter().map(|o| o.name.clone()).collect();
    let inputs: Vec<(IOName, Tensor)> = spec
        .inputs
        .iter()
        .map(|input| {
            let mut dims: Vec<usize> = input.dims.iter().map(|d| d.unwrap_or(1)).collect();
            if let Some(lead) = dims.first_mut() {
                *lead = batch;
            }
            let shape = Shape::from_slice(&dims);
            let values: Vec<f32> = (0..shape.numel()).map(|i| (i % 255) as f32 / 255.0).collect();
            (input.name.clone(), Tensor::from_f32(shape, &values))
        })
        .collect();

    let pipeline = Pipeline::spawn(BatchPolicy::from(&batching), sessions)?;
    let started = Instant::now();
    let mut pending = Vec::with_capacity(requests);
    for _ in 0..requests {
        let (req, rx) =
            InferenceRequest::new(spec.name.clone(), inputs.clone(), output_names.clone());
        pipeline
            .tx
            .send(req)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        pending.push(rx);
    }

    let mut backend_us = 0u64;
    let mut failed = 0usize;
    for rx in pending {
        match rx.await.context("worker dropped the request")? {
            Ok(resp) => backend_us += resp.timings.backend_us,
            Err(err) => {
                failed += 1;
                tracing::warn!(error = %err, "request failed");
            }
        }
    }
    let elapsed = started.elapsed();
    pipeline.shutdown().await;

    tracing::info!(
        requests,
        failed,
        rows_per_request = batch,
        elapsed_ms = elapsed.as_millis() as u64,
        mean_backend_us = backend_us / requests.max(1) as u64,
        "bench finished"
    );
    Ok(())
}
