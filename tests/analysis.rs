use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::{Normal, Uniform};
use rand_isaac::Isaac64Rng;
use serde::Serialize;
use tempdir::TempDir;

use rubisco_kinetics::bootstrap::bootstrap;
use rubisco_kinetics::combine::combine_measurements;
use rubisco_kinetics::config::Config;
use rubisco_kinetics::dataset::{self, Column};
use rubisco_kinetics::kinetics::infer_batch;
use rubisco_kinetics::powerlaw::{fit_odr, fit_ols, Estimator};
use rubisco_kinetics::sampling::Measurement;
use rubisco_kinetics::{Error, Result};

#[derive(Serialize)]
struct Row {
    species: String,
    mutant: bool,
    isoform: u8,
    taxonomy: &'static str,
    short_ref: String,
    pmid_or_doi: String,
    #[serde(rename = "KC")]
    kc: f64,
    #[serde(rename = "KC_SD")]
    kc_sd: f64,
    #[serde(rename = "vC")]
    vc: f64,
    #[serde(rename = "vC_SD")]
    vc_sd: f64,
    #[serde(rename = "S")]
    s: f64,
    #[serde(rename = "S_SD")]
    s_sd: f64,
    #[serde(rename = "KO")]
    ko: f64,
    #[serde(rename = "KO_SD")]
    ko_sd: f64,
    #[serde(rename = "vO")]
    vo: f64,
    #[serde(rename = "kon_C")]
    kon_c: f64,
    #[serde(rename = "kon_O")]
    kon_o: f64,
}

const EXPONENT: f64 = 0.5;
const PREFACTOR: f64 = 0.9;

/// Synthetic variants on the power law `vC = PREFACTOR * KC^EXPONENT`, with log-normal scatter
fn generate_rows<R: Rng>(rng: &mut R, num_species: usize) -> Vec<Row> {
    let scatter = Normal::<f64>::new(0., 0.1).unwrap();
    let kc_range = Uniform::new(1f64.ln(), 300f64.ln());

    (0..num_species)
        .map(|ii| {
            let kc = rng.sample(kc_range).exp();
            let vc = PREFACTOR * kc.powf(EXPONENT) * rng.sample(scatter).exp();
            let s = 1500. / kc.sqrt();
            let ko = 40. * kc;
            let vo = ko * vc / (s * kc);
            Row {
                species: format!("species {ii}"),
                mutant: false,
                isoform: 1,
                taxonomy: "plant",
                short_ref: format!("ref {ii}"),
                pmid_or_doi: (1000 + ii).to_string(),
                kc,
                kc_sd: 0.05 * kc,
                vc,
                vc_sd: 0.05 * vc,
                s,
                s_sd: 0.02 * s,
                ko,
                ko_sd: 0.05 * ko,
                vo,
                kon_c: vc / kc,
                kon_o: vo / ko,
            }
        })
        .collect()
}

fn write_dataset(dir: &TempDir, rows: &[Row]) -> Result<std::path::PathBuf> {
    let path = dir.path().join("rubisco_kinetics.csv");
    let mut wtr = csv::Writer::from_path(&path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    // A duplicated measurement, as carried by later compilations of the same data
    wtr.serialize(&rows[0])?;
    wtr.flush()?;
    Ok(path)
}

#[test]
fn dataset_correlation_is_recovered_by_bootstrap() -> Result<()> {
    let tmp_dir = TempDir::new("dataset_correlation_is_recovered_by_bootstrap").unwrap();
    let config_path = tmp_dir.path().join("analysis.toml");
    std::fs::write(
        &config_path,
        "seed = 40\n[bootstrap]\nrounds = 200\nestimator = \"odr\"\n",
    )
    .unwrap();
    let config = Config::from_file(&config_path)?;
    let mut rng = config.rng();

    let num_species = 60;
    let rows = generate_rows(&mut Isaac64Rng::seed_from_u64(7), num_species);
    let path = write_dataset(&tmp_dir, &rows)?;

    let loaded = dataset::load_csv(&path)?;
    assert_eq!(loaded.len(), num_species + 1);
    let cleaned = dataset::filter_complete(&dataset::deduplicate(&loaded));
    assert_eq!(cleaned.len(), num_species);

    let kc = dataset::column(&cleaned, Column::Kc);
    let vc = dataset::column(&cleaned, Column::Vc);

    let distribution = bootstrap(&kc, &vc, &config.bootstrap, &mut rng)?;
    assert_eq!(distribution.len(), 200);

    let exponent = distribution.exponent_summary(0.95)?;
    approx::assert_abs_diff_eq!(exponent.median, EXPONENT, epsilon = 0.1);
    assert!(exponent.ci.low < exponent.median && exponent.median < exponent.ci.high);

    let prefactor = distribution.prefactor_summary(0.95)?;
    assert!(prefactor.median > 0.);
    assert!(distribution.correlations.iter().all(|r| *r > 0.8));

    Ok(())
}

#[test]
fn orthogonal_fit_is_steeper_than_least_squares_on_dataset_columns() -> Result<()> {
    let rows = generate_rows(&mut Isaac64Rng::seed_from_u64(40), 80);
    let log_kc = rows.iter().map(|row| row.kc.ln()).collect::<Vec<_>>();
    let log_vc = rows.iter().map(|row| row.vc.ln()).collect::<Vec<_>>();

    let ols = fit_ols(&log_kc, &log_vc)?;
    let odr = fit_odr(&log_kc, &log_vc, &Config::default().bootstrap.odr)?;

    assert!(odr.exponent >= ols.exponent);
    assert!(ols.p_value < 1e-6);
    approx::assert_abs_diff_eq!(odr.exponent, EXPONENT, epsilon = 0.1);
    Ok(())
}

#[test]
fn inferred_oxygenation_matches_dataset() -> Result<()> {
    let tmp_dir = TempDir::new("inferred_oxygenation_matches_dataset").unwrap();
    let rows = generate_rows(&mut Isaac64Rng::seed_from_u64(40), 12);
    let path = write_dataset(&tmp_dir, &rows)?;

    let loaded = dataset::deduplicate(&dataset::load_csv(&path)?);
    let records = loaded.iter().map(|row| row.record()).collect::<Vec<_>>();

    let config = Config::default();
    let derived = infer_batch(&records, &config.inference, &mut config.rng())?;

    assert_eq!(derived.len(), loaded.len());
    for (row, derived) in loaded.iter().zip(&derived) {
        let vo = derived.vo.estimate().expect("complete record must infer kcat,O");
        approx::assert_relative_eq!(vo.median, row.vo, max_relative = 0.05);
        assert!(vo.ci.contains(row.vo));

        let kon_c = derived.kon_c.estimate().expect("kon,C is always inferred");
        approx::assert_relative_eq!(kon_c.median, row.kon_c, max_relative = 0.05);
    }

    let carboxylation = loaded
        .iter()
        .map(|row| Measurement::new(row.vc, row.vc_sd))
        .collect::<Vec<_>>();
    let pooled = combine_measurements(&carboxylation, &config.combine, &mut config.rng())?;
    let lowest = loaded.iter().map(|row| row.vc).fold(f64::INFINITY, f64::min);
    let highest = loaded.iter().map(|row| row.vc).fold(f64::NEG_INFINITY, f64::max);
    assert!(lowest < pooled.value && pooled.value < highest);
    assert!(pooled.uncertainty > 0.);
    Ok(())
}

#[test]
fn unit_exponent_bootstrap_fixes_every_round() -> Result<()> {
    let rows = generate_rows(&mut Isaac64Rng::seed_from_u64(40), 30);
    let ko = rows.iter().map(|row| row.ko).collect::<Vec<_>>();
    let kc = rows.iter().map(|row| row.kc).collect::<Vec<_>>();

    let mut config = Config::default();
    config.bootstrap.rounds = 100;
    config.bootstrap.estimator = Estimator::OdrUnitExponent;

    // KO = 40 KC exactly, so every round recovers the prefactor
    let distribution = bootstrap(&kc, &ko, &config.bootstrap, &mut config.rng())?;
    assert!(distribution.exponents.iter().all(|e| *e == 1.));
    for prefactor in &distribution.prefactors {
        approx::assert_relative_eq!(*prefactor, 40., max_relative = 1e-10);
    }
    Ok(())
}

#[test]
fn missing_dataset_is_an_io_error() {
    let tmp_dir = TempDir::new("missing_dataset_is_an_io_error").unwrap();
    let result = dataset::load_csv(&tmp_dir.path().join("absent.csv"));
    assert!(matches!(result, Err(Error::Io(_))));
}
