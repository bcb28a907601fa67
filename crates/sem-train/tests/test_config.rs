//! Integration tests for [`sem_train::config::SemConfig`].

use sem_train::config::SemConfig;
use sem_train::error::ConfigError;

#[test]
fn defaults_are_valid() {
    let cfg = SemConfig::default();
    cfg.validate().expect("default config must be valid");
    assert_eq!(cfg.samples_per_second(), 25.0);
    assert_eq!(cfg.active_event_threshold, 600);
    assert!(cfg.sem_params().contains("'lmda': 10"));
}

#[test]
fn partial_json_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sem.json");
    std::fs::write(&path, r#"{ "tag": "dec_6", "epochs": 12, "use_depth": false, "optical_scaling": "min_max" }"#).unwrap();

    let cfg = SemConfig::from_json(&path).unwrap();
    assert_eq!(cfg.tag, "dec_6");
    assert_eq!(cfg.epochs, 12);
    assert_eq!(cfg.rate_ms, 40.0);
    assert_eq!(cfg.objhand_options().mode, sem_features::DistanceMode::Planar);
    assert_eq!(cfg.scene_options().num_objects, 30);
    assert_eq!(cfg.optical_scaling, sem_features::Scaling::MinMax);
    assert!(cfg.pca_whiten);
}

#[test]
fn json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sem.json");
    let mut cfg = SemConfig::default();
    cfg.kappa = 0.5;
    cfg.train_stratified = true;
    cfg.to_json(&path).unwrap();
    let back = SemConfig::from_json(&path).unwrap();
    assert_eq!(back.kappa, 0.5);
    assert!(back.train_stratified);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ tag: ").unwrap();
    assert!(matches!(SemConfig::from_json(&path), Err(ConfigError::ParseError { .. })));
    assert!(matches!(
        SemConfig::from_json(&dir.path().join("missing.json")),
        Err(ConfigError::FileRead { .. })
    ));
}

#[test]
fn invalid_values_name_the_field() {
    let cases: Vec<(Box<dyn Fn(&mut SemConfig)>, &str)> = vec![
        (Box::new(|c| c.rate_ms = 0.0), "rate_ms"),
        (Box::new(|c| c.epochs = 0), "epochs"),
        (Box::new(|c| c.eval_offset = 5), "eval_offset"),
        (Box::new(|c| c.alfa = 0.0), "alfa"),
        (Box::new(|c| c.kappa = -1.0), "kappa"),
        (Box::new(|c| c.min_column_survival = 1.5), "min_column_survival"),
        (Box::new(|c| c.use_cache = true), "cache_tag"),
        (Box::new(|c| c.pca = true), "pca_tag"),
        (Box::new(|c| c.min_boundary = 60), "min_boundary"),
    ];
    for (mutate, field) in cases {
        let mut cfg = SemConfig::default();
        mutate(&mut cfg);
        match cfg.validate() {
            Err(ConfigError::InvalidValue { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected InvalidValue for {field}, got {other:?}"),
        }
    }
}

#[test]
fn evaluation_cadence_follows_offset() {
    let mut cfg = SemConfig::default();
    let evals: Vec<usize> = (1..=12).filter(|&e| cfg.is_eval_epoch(e)).collect();
    assert_eq!(evals, vec![1, 6, 11]);

    cfg.eval_offset = 0;
    let evals: Vec<usize> = (1..=12).filter(|&e| cfg.is_eval_epoch(e)).collect();
    assert_eq!(evals, vec![5, 10]);

    cfg.evaluate = false;
    assert!(!cfg.is_eval_epoch(1));
}
