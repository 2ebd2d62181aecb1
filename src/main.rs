use dwi_convert::{ConversionOptions, DwiConverter, GradientProvider, LogSink, SeriesLoader};

fn main() -> dwi_convert::Result<()> {
    env_logger::init();

    let options = ConversionOptions::default();
    let series = SeriesLoader::load_from_directory("dicom", options.sort_by)?;
    let gradients = GradientProvider::fsl("dicom/dwi.bval", "dicom/dwi.bvec");
    let dataset = DwiConverter::new(series, options).convert(&gradients, &mut LogSink)?;

    let written = dataset.write("dwi.nhdr", &mut LogSink)?;
    log::info!("wrote {written:?}");
    Ok(())
}
