//! Projection between the geographic CRS and the fixed metric CRS.
//!
//! All analysis geometry is built in GDA2020 / MGA zone 55 (EPSG:7855), a
//! transverse Mercator projection on the GRS80 ellipsoid; results are
//! reported in WGS84 longitude/latitude degrees. The two operations are
//! plain coordinate-pair transforms with no mutable state, so a single
//! [`MetricProjection`] can be shared across concurrent queries.
//!
//! The implementation is the Krüger series in terms of the third flattening
//! `n`, with terms through n³. Within a single MGA zone the series error is
//! far below a millimetre, well inside the sub-metre round-trip budget the
//! intersection tolerances downstream assume.

/// GRS80 semi-major axis (metres).
const GRS80_A: f64 = 6_378_137.0;

/// GRS80 inverse flattening.
const GRS80_INV_F: f64 = 298.257_222_101;

/// MGA zone 55 central meridian (degrees east).
const MGA55_LON0: f64 = 147.0;

/// MGA central scale factor.
const MGA_K0: f64 = 0.9996;

/// MGA false easting (metres).
const MGA_FALSE_EASTING: f64 = 500_000.0;

/// MGA false northing (metres).
const MGA_FALSE_NORTHING: f64 = 10_000_000.0;

/// Bidirectional WGS84 <-> EPSG:7855 transform with precomputed series
/// coefficients.
#[derive(Debug, Clone)]
pub struct MetricProjection {
    /// Scaled rectifying radius: k0 * A.
    k0a: f64,
    /// Forward series coefficients (alpha 1..=3).
    alpha: [f64; 3],
    /// Inverse series coefficients (beta 1..=3).
    beta: [f64; 3],
    /// Conformal-to-geodetic latitude coefficients (delta 1..=3).
    delta: [f64; 3],
    /// 2 * sqrt(n) / (1 + n), used for the conformal latitude.
    conformal_c: f64,
    /// Central meridian (radians).
    lon0: f64,
}

impl Default for MetricProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricProjection {
    /// Construct the fixed EPSG:7855 projection.
    pub fn new() -> Self {
        let f = 1.0 / GRS80_INV_F;
        let n = f / (2.0 - f);
        let n2 = n * n;
        let n3 = n2 * n;

        // Rectifying radius A = a/(1+n) * (1 + n^2/4 + n^4/64).
        let a_rect = GRS80_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);

        let alpha = [
            n / 2.0 - 2.0 / 3.0 * n2 + 5.0 / 16.0 * n3,
            13.0 / 48.0 * n2 - 3.0 / 5.0 * n3,
            61.0 / 240.0 * n3,
        ];
        let beta = [
            n / 2.0 - 2.0 / 3.0 * n2 + 37.0 / 96.0 * n3,
            n2 / 48.0 + n3 / 15.0,
            17.0 / 480.0 * n3,
        ];
        let delta = [
            2.0 * n - 2.0 / 3.0 * n2 - 2.0 * n3,
            7.0 / 3.0 * n2 - 8.0 / 5.0 * n3,
            56.0 / 15.0 * n3,
        ];

        Self {
            k0a: MGA_K0 * a_rect,
            alpha,
            beta,
            delta,
            conformal_c: 2.0 * n.sqrt() / (1.0 + n),
            lon0: MGA55_LON0.to_radians(),
        }
    }

    /// Project a geographic coordinate (degrees) to metric easting/northing
    /// (metres).
    pub fn to_metric(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let dlon = lon.to_radians() - self.lon0;

        // Conformal latitude.
        let sin_phi = phi.sin();
        let t = (sin_phi.atanh() - self.conformal_c * (self.conformal_c * sin_phi).atanh()).sinh();

        let xi_p = t.atan2(dlon.cos());
        let eta_p = (dlon.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, a) in self.alpha.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi += a * (m * xi_p).sin() * (m * eta_p).cosh();
            eta += a * (m * xi_p).cos() * (m * eta_p).sinh();
        }

        (
            MGA_FALSE_EASTING + self.k0a * eta,
            MGA_FALSE_NORTHING + self.k0a * xi,
        )
    }

    /// Project a metric easting/northing (metres) back to geographic
    /// longitude/latitude (degrees).
    pub fn to_geographic(&self, x: f64, y: f64) -> (f64, f64) {
        let xi = (y - MGA_FALSE_NORTHING) / self.k0a;
        let eta = (x - MGA_FALSE_EASTING) / self.k0a;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, b) in self.beta.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            xi_p -= b * (m * xi).sin() * (m * eta).cosh();
            eta_p -= b * (m * xi).cos() * (m * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut phi = chi;
        for (j, d) in self.delta.iter().enumerate() {
            let m = 2.0 * (j + 1) as f64;
            phi += d * (m * chi).sin();
        }

        let lon = self.lon0 + eta_p.sinh().atan2(xi_p.cos());
        (lon.to_degrees(), phi.to_degrees())
    }
}
