//! # Pipeline Scenario Tests
//!
//! Whole pipelines driven through the public driver API: expression
//! attributes, muting, scaling, verification, and abort propagation.

use geoflow::application::{JobOutcome, JobSpec, PipelineDriver};
use geoflow::infrastructure::store::VolumeStore;
use geoflow_domain::entities::DataFlow;

fn run_job(yaml: &str) -> JobOutcome {
    let spec = JobSpec::from_yaml(yaml).unwrap();
    let mut driver = PipelineDriver::from_spec(&spec).unwrap();
    let mut flow = DataFlow::new();
    driver.run(&mut flow)
}

fn read_f32_slice(store: &VolumeStore, channel: usize, inline: usize) -> Vec<f32> {
    store
        .read_slice(channel, 2, inline)
        .unwrap()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// A constant-amplitude test source over inlines 0..3, crosslines 0..2,
/// five samples spanning 0..20000 axis units.
fn constant_source(datadir: &str, value: f64) -> String {
    format!(
        r#"
  - module: testgendata
    config:
      testgendata:
        datadir: {datadir}
        primarykey: {{name: inline, first: 0, last: 3, step: 1}}
        secondarykey: {{name: crossline, first: 0, last: 2, step: 1}}
        tracekey:
          name: seismic
          tmin: 0.0
          tmax: 20000.0
          length: 41
          data:
            sequence: {{min: {value}, max: {value}, step: 0.0, type: float}}
"#
    )
}

#[test]
fn test_expression_attribute_is_verified_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let datadir = dir.path().display().to_string();
    let yaml = format!(
        r#"
pipeline:
{source}
  - module: attrcalc
    config:
      attrcalc:
        attrname: attr
        action: create
        expr: "inline + crossline * 2.7"
        type: r32
  - module: attrlist
    config:
      attrlist:
        attributes: [inline, crossline, seismic, attr]
  - module: testexpect
    config:
      testexpect:
        datadir: {datadir}
        primarykey: {{name: inline, first: 0, last: 3, step: 1}}
        secondarykey: {{name: crossline, first: 0, last: 2, step: 1}}
        tracekey: {{name: seismic, length: 41, pattern: SAME}}
        attribute:
          - {{name: attr, pattern: "INLINE+CROSSLINE*2.7"}}
"#,
        source = constant_source(&datadir, 100.0),
        datadir = datadir
    );
    assert_eq!(run_job(&yaml), JobOutcome::Completed);
}

#[test]
fn test_mute_ramp_reaches_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let datadir = dir.path().display().to_string();
    let url = dir.path().join("muted.gfv").display().to_string();
    let yaml = format!(
        r#"
pipeline:
{source}
  - module: mute
    config:
      mute:
        compare_direction: ">"
        threshold:
          value: 3000
        tapering_window_size: 2000
  - module: output
    config:
      output:
        url: {url}
        brick_size: 4
"#,
        source = constant_source(&datadir, 100.0),
        url = url
    );
    assert_eq!(run_job(&yaml), JobOutcome::Completed);

    // Sample axis 0..20000 in 41 samples: step 500. Factor 1 below 3000,
    // linear ramp to 0 at 5000, 0 above; trace = 100 * factor.
    let store = VolumeStore::open(&url).unwrap();
    let values = read_f32_slice(&store, 0, 1);
    for row in 0..3 {
        let trace = &values[row * 41..(row + 1) * 41];
        for (i, value) in trace.iter().enumerate() {
            let t = i as f64 * 500.0;
            let expected = if t < 3000.0 {
                100.0
            } else if t < 5000.0 {
                (100.0 * (5000.0 - t) / 2000.0) as f32
            } else {
                0.0
            };
            assert_eq!(*value, expected, "row {} sample {}", row, i);
        }
    }
}

#[test]
fn test_spherical_divergence_squares_the_axis() {
    let dir = tempfile::tempdir().unwrap();
    let datadir = dir.path().display().to_string();
    let url = dir.path().join("diverged.gfv").display().to_string();
    let yaml = format!(
        r#"
pipeline:
  - module: testgendata
    config:
      testgendata:
        datadir: {datadir}
        primarykey: {{name: inline, first: 0, last: 1, step: 1}}
        secondarykey: {{name: crossline, first: 0, last: 1, step: 1}}
        tracekey:
          name: seismic
          tmin: 0.0
          tmax: 10.0
          length: 11
          data:
            sequence: {{min: 1.0, max: 1.0, step: 0.0, type: float}}
  - module: scale
    config:
      scale:
        method:
          diverge: {{a: 2.0, v: 1.0}}
  - module: output
    config:
      output:
        url: {url}
        brick_size: 16
"#
    );
    assert_eq!(run_job(&yaml), JobOutcome::Completed);

    let store = VolumeStore::open(&url).unwrap();
    let values = read_f32_slice(&store, 0, 0);
    for (i, value) in values[..11].iter().enumerate() {
        assert_eq!(*value, (i * i) as f32);
    }
}

#[test]
fn test_agc_flattens_constant_amplitudes() {
    let dir = tempfile::tempdir().unwrap();
    let datadir = dir.path().display().to_string();
    let url = dir.path().join("agc.gfv").display().to_string();
    let yaml = format!(
        r#"
pipeline:
{source}
  - module: scale
    config:
      scale:
        method:
          agc: {{window_size: 2000}}
  - module: output
    config:
      output:
        url: {url}
        brick_size: 8
"#,
        source = constant_source(&datadir, 4.0),
        url = url
    );
    assert_eq!(run_job(&yaml), JobOutcome::Completed);

    let store = VolumeStore::open(&url).unwrap();
    let values = read_f32_slice(&store, 0, 2);
    assert!(values.iter().all(|v| *v == 1.0), "{:?}", values);
}

#[test]
fn test_writer_emits_exactly_four_bricks_along_primary() {
    let brick = 4;
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("bricks.gfv").display().to_string();
    // Primary range spans 4 x brick inlines; secondary and sample axes are
    // one brick each.
    let yaml = format!(
        r#"
pipeline:
  - module: gendata
    config:
      gendata:
        maxtime: 15
        sinterval: 5000
        dataname: seismic
        primarykey: {{name: inline, first: 0, last: {last}, step: 1}}
        secondarykey: {{name: crossline, first: 0, last: {slast}, step: 1}}
        signal:
          ricker: {{pfreq: 25, gate: 10, times: [5]}}
  - module: output
    config:
      output:
        url: {url}
        brick_size: {brick}
        compression: zip
"#,
        last = 4 * brick - 1,
        slast = brick - 1,
        url = url,
        brick = brick
    );
    assert_eq!(run_job(&yaml), JobOutcome::Completed);

    let store = VolumeStore::open(&url).unwrap();
    let grid = store.layout().chunk_grid(0);
    assert_eq!(grid.counts(), [1, 1, 4]);
    assert_eq!(grid.chunk_count(), 4);
    for chunk in 0..4 {
        assert_ne!(store.chunk_hash(0, chunk), 0, "brick {} missing", chunk);
    }
}

#[test]
fn test_unknown_expression_variable_aborts_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let datadir = dir.path().display().to_string();
    let yaml = format!(
        r#"
pipeline:
{source}
  - module: attrcalc
    config:
      attrcalc:
        attrname: broken
        action: create
        expr: "inline + missing_thing"
        type: r32
"#,
        source = constant_source(&datadir, 1.0)
    );
    assert_eq!(run_job(&yaml), JobOutcome::Aborted);
}

#[test]
fn test_attrcalc_update_identity_passes_verification() {
    let dir = tempfile::tempdir().unwrap();
    let datadir = dir.path().display().to_string();
    let yaml = format!(
        r#"
pipeline:
{source}
  - module: attrcalc
    config:
      attrcalc:
        attrname: seismic
        action: update
        expr: "seismic"
        type: r32
  - module: testexpect
    config:
      testexpect:
        datadir: {datadir}
        primarykey: {{name: inline, first: 0, last: 3, step: 1}}
        secondarykey: {{name: crossline, first: 0, last: 2, step: 1}}
        tracekey: {{name: seismic, length: 41, pattern: SAME}}
"#,
        source = constant_source(&datadir, 12.5),
        datadir = datadir
    );
    assert_eq!(run_job(&yaml), JobOutcome::Completed);
}
