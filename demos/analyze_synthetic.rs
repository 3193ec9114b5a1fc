//! Analyze a small synthetic batch and print the report JSON

use gaze_flux::{AnalysisConfig, FrameRecord, GazeProcessor, ReportEncoder};

const CONFIG: &str = r#"{
    "min_fixation_frames": 3,
    "sampling_rate_hz": 30.0,
    "aoi_table": {
        "off_target": {"object": "none", "region": "none"},
        "entries": [
            {"object": "mother", "region": "face", "category": "mother_face", "actor": "mother"},
            {"object": "toy", "region": "body", "category": "toy"},
            {"object": "father", "region": "face", "category": "father_face", "actor": "father"}
        ]
    },
    "patterns": [
        {"name": "triadic", "steps": ["mother_face", "toy", "father_face"]}
    ],
    "max_pattern_gap": 1,
    "metrics": [
        {"metric": "attention_proportion", "category": "toy", "weight": "fixation_frames"},
        {"metric": "pattern_count", "pattern": "triadic", "weight": "on_target_frames"}
    ]
}"#;

/// M = mother face, T = toy, F = father face, anything else = off-target
fn frames(participant: &str, condition: &str, labels: &str) -> Vec<FrameRecord> {
    labels
        .chars()
        .enumerate()
        .map(|(i, label)| {
            let (object, region) = match label {
                'M' => ("mother", "face"),
                'T' => ("toy", "body"),
                'F' => ("father", "face"),
                _ => ("none", "none"),
            };
            FrameRecord::new(participant, "t1", i as u64, i as f64 * 1000.0 / 30.0)
                .with_group("12m", condition)
                .with_labels(object, region)
        })
        .collect()
}

fn main() {
    let mut records = frames("p1", "social", "MMMMTTTTTFFFF");
    records.extend(frames("p2", "social", "MMM--TTTTTTMFFF"));
    records.extend(frames("p3", "nonsocial", "TTTTTTTT---TTTT"));
    records.extend(frames("p4", "nonsocial", "MM-TT-FF"));

    let report = AnalysisConfig::from_json(CONFIG)
        .and_then(GazeProcessor::new)
        .and_then(|processor| processor.analyze_records(&records))
        .and_then(|report| ReportEncoder::new().encode_to_json(&report));

    match report {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
