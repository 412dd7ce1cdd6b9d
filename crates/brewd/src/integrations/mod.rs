#[cfg(feature = "integration_lamarzocco")]
mod lamarzocco;
