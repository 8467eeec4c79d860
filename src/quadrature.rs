// Adaptive Gauss-Kronrod quadrature (61-point Kronrod / 30-point Gauss pair)
use tracing::trace;

use crate::error::{Error, Result};

/// Kronrod abscissae on [0, 1]; odd indices are the 30-point Gauss nodes.
const XGK: [f64; 31] = [
    0.999484410050490637571325895705811,
    0.996893484074649540271630050918695,
    0.991630996870404594858628366109486,
    0.983668123279747209970032581605663,
    0.973116322501126268374693868423707,
    0.960021864968307512216871025581798,
    0.944374444748559979415831324037439,
    0.926200047429274325879324277080474,
    0.905573307699907798546522558925958,
    0.882560535792052681543116462530226,
    0.857205233546061098958658510658944,
    0.829565762382768397442898119732502,
    0.799727835821839083013668942322683,
    0.767777432104826194917977340974503,
    0.733790062453226804726171131369528,
    0.697850494793315796932292388026640,
    0.660061064126626961370053668149271,
    0.620526182989242861140477556431189,
    0.579345235826361691756024932172540,
    0.536624148142019899264169793311073,
    0.492480467861778574993693061207709,
    0.447033769538089176780609900322854,
    0.400401254830394392535476211542661,
    0.352704725530878113471037207089374,
    0.304073202273625077372677107199257,
    0.254636926167889846439805129817805,
    0.204525116682309891438957671002025,
    0.153869913608583546963794672743256,
    0.102806937966737030147096751318001,
    0.051471842555317695833025213166723,
    0.000000000000000000000000000000000,
];

/// Kronrod weights matching `XGK`.
const WGK: [f64; 31] = [
    0.001389013698677007624551591226760,
    0.003890461127099884051267201844516,
    0.006630703915931292173319826369750,
    0.009273279659517763428441146892024,
    0.011823015253496341742232898853251,
    0.014369729507045804812451432443580,
    0.016920889189053272627572289420322,
    0.019414141193942381173408951050128,
    0.021828035821609192297167485738339,
    0.024191162078080601365686370725232,
    0.026509954882333101610601709335075,
    0.028754048765041292843978785354334,
    0.030907257562387762472884252943092,
    0.032981447057483726031814191016854,
    0.034979338028060024137499670731468,
    0.036882364651821229223911065617136,
    0.038678945624727592950348651532281,
    0.040374538951535959111995279752468,
    0.041969810215164246147147541285970,
    0.043452539701356069316831728117073,
    0.044814800133162663192355551616723,
    0.046059238271006988116271735559374,
    0.047185546569299153945261478181099,
    0.048185861757087129140779492298305,
    0.049055434555029778887528165367238,
    0.049795683427074206357811569379942,
    0.050405921402782346840893085653585,
    0.050881795898749606492297473049805,
    0.051221547849258772170656282604944,
    0.051426128537459025933862879215781,
    0.051494729429451567558340433647099,
];

/// Gauss weights for the nodes `XGK[1], XGK[3], ..., XGK[29]`.
const WG: [f64; 15] = [
    0.007968192496166605615465883474674,
    0.018466468311090959142302131912047,
    0.028784707883323369349719179611292,
    0.038799192569627049596801936446348,
    0.048402672830594052902938140422808,
    0.057493156217619066481721689402056,
    0.065974229882180495128128515115962,
    0.073755974737705206268243850022191,
    0.080755895229420215354694938460530,
    0.086899787201082979802387530715126,
    0.092122522237786128717632707087619,
    0.096368737174644259639468626351810,
    0.099593420586795267062780282103569,
    0.101762389748405504596428952168554,
    0.102852652893558840341285636705415,
];

/// One evaluated subinterval.
#[derive(Debug, Clone, Copy)]
struct Segment {
    a: f64,
    b: f64,
    result: f64,
    error: f64,
}

/// Adaptive 61-point Gauss-Kronrod integrator.
///
/// The subinterval with the largest error estimate is bisected until the
/// total error is below `max(absolute_tolerance, relative_tolerance * |result|)`.
/// Hitting the subinterval cap is a `ConvergenceFailure`.
#[derive(Debug, Clone, Copy)]
pub struct GaussKronrodIntegrator {
    relative_tolerance: f64,
    absolute_tolerance: f64,
    max_subintervals: usize,
}

impl GaussKronrodIntegrator {
    pub fn new(relative_tolerance: f64) -> Result<Self> {
        if !(relative_tolerance > 0.0 && relative_tolerance.is_finite()) {
            return Err(Error::invalid_parameter(
                "relative_tolerance",
                format!("must be positive and finite, got {relative_tolerance}"),
            ));
        }
        Ok(GaussKronrodIntegrator {
            relative_tolerance,
            absolute_tolerance: 0.0,
            max_subintervals: 1000,
        })
    }

    pub fn with_absolute_tolerance(mut self, absolute_tolerance: f64) -> Self {
        self.absolute_tolerance = absolute_tolerance.max(0.0);
        self
    }

    pub fn with_max_subintervals(mut self, max_subintervals: usize) -> Self {
        self.max_subintervals = max_subintervals.max(1);
        self
    }

    pub fn relative_tolerance(&self) -> f64 {
        self.relative_tolerance
    }

    /// Apply the 61-point rule once on `[a, b]`.
    ///
    /// # Returns
    /// `(result, abs_error)` with the QUADPACK error estimate
    pub fn integrate_gk61<F>(&self, f: &F, a: f64, b: f64) -> Result<(f64, f64)>
    where
        F: Fn(f64) -> Result<f64>,
    {
        let center = 0.5 * (a + b);
        let half_length = 0.5 * (b - a);
        let abs_half_length = half_length.abs();

        let fc = f(center)?;
        let mut resg = 0.0;
        let mut resk = WGK[30] * fc;
        let mut resabs = resk.abs();
        let mut fv1 = [0.0; 30];
        let mut fv2 = [0.0; 30];

        for j in 0..15 {
            let jtw = 2 * j + 1;
            let dx = half_length * XGK[jtw];
            let f1 = f(center - dx)?;
            let f2 = f(center + dx)?;
            fv1[jtw] = f1;
            fv2[jtw] = f2;
            resg += WG[j] * (f1 + f2);
            resk += WGK[jtw] * (f1 + f2);
            resabs += WGK[jtw] * (f1.abs() + f2.abs());
        }
        for j in 0..15 {
            let jtwm1 = 2 * j;
            let dx = half_length * XGK[jtwm1];
            let f1 = f(center - dx)?;
            let f2 = f(center + dx)?;
            fv1[jtwm1] = f1;
            fv2[jtwm1] = f2;
            resk += WGK[jtwm1] * (f1 + f2);
            resabs += WGK[jtwm1] * (f1.abs() + f2.abs());
        }

        let reskh = 0.5 * resk;
        let mut resasc = WGK[30] * (fc - reskh).abs();
        for j in 0..30 {
            resasc += WGK[j] * ((fv1[j] - reskh).abs() + (fv2[j] - reskh).abs());
        }

        let result = resk * half_length;
        resabs *= abs_half_length;
        resasc *= abs_half_length;
        let mut abs_error = ((resk - resg) * half_length).abs();
        if resasc != 0.0 && abs_error != 0.0 {
            abs_error = resasc * (200.0 * abs_error / resasc).powf(1.5).min(1.0);
        }
        if resabs > f64::MIN_POSITIVE / (50.0 * f64::EPSILON) {
            abs_error = abs_error.max(50.0 * f64::EPSILON * resabs);
        }
        Ok((result, abs_error))
    }

    /// Integrate `f` over `[a, b]` adaptively.
    ///
    /// # Returns
    /// `(result, abs_error)`, or `ConvergenceFailure` at the subinterval cap
    pub fn integrate_adaptively<F>(&self, f: F, a: f64, b: f64) -> Result<(f64, f64)>
    where
        F: Fn(f64) -> Result<f64>,
    {
        if !(a.is_finite() && b.is_finite()) {
            return Err(Error::domain(format!(
                "integration limits must be finite, got [{a}, {b}]"
            )));
        }
        if a == b {
            return Ok((0.0, 0.0));
        }

        let (result, error) = self.integrate_gk61(&f, a, b)?;
        let mut segments = vec![Segment { a, b, result, error }];
        let mut total = result;
        let mut total_error = error;

        loop {
            let tolerance = self
                .absolute_tolerance
                .max(self.relative_tolerance * total.abs());
            if total_error <= tolerance {
                trace!(a, b, subintervals = segments.len(), total, "quadrature converged");
                return Ok((total, total_error));
            }
            if segments.len() >= self.max_subintervals {
                return Err(Error::ConvergenceFailure {
                    iterations: segments.len(),
                    estimate: total,
                    error: total_error,
                });
            }

            let worst = segments
                .iter()
                .enumerate()
                .max_by(|(_, x), (_, y)| x.error.total_cmp(&y.error))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let parent = segments.swap_remove(worst);
            let midpoint = 0.5 * (parent.a + parent.b);
            let (left, left_error) = self.integrate_gk61(&f, parent.a, midpoint)?;
            let (right, right_error) = self.integrate_gk61(&f, midpoint, parent.b)?;

            total += left + right - parent.result;
            total_error += left_error + right_error - parent.error;
            segments.push(Segment {
                a: parent.a,
                b: midpoint,
                result: left,
                error: left_error,
            });
            segments.push(Segment {
                a: midpoint,
                b: parent.b,
                result: right,
                error: right_error,
            });
        }
    }
}
