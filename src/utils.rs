/// Upright and rotated rectangles, 3D boxes
pub mod bbox;

/// RGB to 8-bit HSV and grayscale conversion
pub mod color;

/// Hue/saturation histograms and back-projection
pub mod histogram;

/// Image moments, mean-shift and CAMShift window convergence
pub mod mean_shift;

/// k-nearest-neighbour distance statistics
pub mod knn;

/// Rate limited logging
pub mod throttle;
