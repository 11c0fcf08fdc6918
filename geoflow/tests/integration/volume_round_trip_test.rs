//! # Volume Round-Trip Tests
//!
//! Write a volume with one pipeline, read it back with another, and
//! confirm the store contents and the reread stream are intact.

use geoflow::application::{JobOutcome, JobSpec, PipelineDriver};
use geoflow::infrastructure::store::VolumeStore;
use geoflow_domain::entities::DataFlow;

fn run_job(yaml: &str) -> JobOutcome {
    let spec = JobSpec::from_yaml(yaml).unwrap();
    let mut driver = PipelineDriver::from_spec(&spec).unwrap();
    let mut flow = DataFlow::new();
    driver.run(&mut flow)
}

fn writer_job(url: &str, compression: &str) -> String {
    format!(
        r#"
pipeline:
  - module: gendata
    config:
      gendata:
        maxtime: 20
        sinterval: 2000
        dataname: seismic
        primarykey: {{name: inline, first: 100, last: 109, step: 1}}
        secondarykey: {{name: crossline, first: 200, last: 204, step: 1}}
        signal:
          ormsby: {{f1: 5, f2: 10, f3: 40, f4: 45, gate: 10, times: [8, 14]}}
          ricker: {{pfreq: 30, gate: 8, times: [4]}}
  - module: output
    config:
      output:
        url: {url}
        brick_size: 4
        compression: {compression}
        lod_levels: 2
"#
    )
}

#[test]
fn test_store_round_trip_preserves_amplitudes() {
    let dir = tempfile::tempdir().unwrap();
    let first_url = dir.path().join("first.gfv").display().to_string();
    let second_url = dir.path().join("second.gfv").display().to_string();

    assert_eq!(run_job(&writer_job(&first_url, "zip")), JobOutcome::Completed);

    // Read the volume back and write it out again unchanged.
    let copy_yaml = format!(
        r#"
pipeline:
  - module: input
    config:
      input:
        url: {first_url}
        sliceposition: on_primary_key
  - module: output
    config:
      output:
        url: {second_url}
        brick_size: 4
"#
    );
    assert_eq!(run_job(&copy_yaml), JobOutcome::Completed);

    let first = VolumeStore::open(&first_url).unwrap();
    let second = VolumeStore::open(&second_url).unwrap();
    assert_eq!(second.layout().primary.count, 10);
    assert_eq!(second.layout().secondary.count, 5);
    assert_eq!(second.layout().data.count, 11);

    for inline in 0..10 {
        let a = first.read_slice(0, 2, inline).unwrap();
        let b = second.read_slice(0, 2, inline).unwrap();
        assert_eq!(a, b, "inline {} differs after the round trip", inline);
    }
}

#[test]
fn test_layout_metadata_survives_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("meta.gfv").display().to_string();
    assert_eq!(run_job(&writer_job(&url, "none")), JobOutcome::Completed);

    let store = VolumeStore::open(&url).unwrap();
    let layout = store.layout();
    assert_eq!(layout.primary.name, "INLINE");
    assert_eq!(layout.secondary.name, "CROSSLINE");
    assert_eq!(layout.data.name, "SEISMIC");
    assert_eq!(layout.data.unit, "ms");
    assert_eq!((layout.primary.min, layout.primary.max), (100.0, 109.0));
    assert_eq!(layout.brick_size, 4);
    assert_eq!(layout.lod_levels, 2);
    assert_eq!(layout.channels.len(), 1);
    assert_eq!(layout.channels[0].name, "Amplitude");
}

#[test]
fn test_timeslice_reading_transposes_the_volume() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("slices.gfv").display().to_string();
    assert_eq!(run_job(&writer_job(&url, "zip")), JobOutcome::Completed);

    // Source the volume as time slices: one group per sample, rows along
    // the store's primary axis.
    use geoflow::infrastructure::stages::create_stage;
    let mut flow = DataFlow::new();
    let input = create_stage("input").unwrap();
    let cfg = format!("input:\n  url: {}\n  sliceposition: on_data_samples\n", url);
    input.init(&mut flow, "in", &cfg).unwrap();

    assert_eq!(flow.group_size(), Some(10));
    assert_eq!(flow.data_vector_length(), Some(5));
    assert_eq!(flow.primary_key_axis().map(|a| a.2), Some(11));

    // Slice 0 equals sample 0 of every trace in the original volume.
    input.process(&mut flow, "in").unwrap();
    let slice = flow
        .buffer(flow.volume_data_name().unwrap())
        .unwrap()
        .as_f32()
        .unwrap()
        .to_vec();

    let store = VolumeStore::open(&url).unwrap();
    let direct = store.read_slice(0, 0, 0).unwrap();
    let direct: Vec<f32> = direct
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    assert_eq!(slice, direct);
}
