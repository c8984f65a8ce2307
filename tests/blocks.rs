use mdf3_rs::blocks::{
    BlockParse, ChannelBlock, ChannelGroupBlock, ConversionBlock, ConversionType,
    DataGroupBlock, DataType, HeaderBlock, IdentificationBlock,
};
use mdf3_rs::{DecodeOptions, Error, Mdf, Result, Samples};

/// Assemble a minimal file by hand: one sorted group, two bit-packed
/// channels sharing a 4-byte record, no master channel.
fn packed_file_image() -> Vec<u8> {
    let mut image = Vec::new();

    image.extend_from_slice(&IdentificationBlock::default().to_bytes());

    let mut hd = HeaderBlock::default();
    hd.first_dg_addr = 272;
    hd.dg_count = 1;
    image.extend_from_slice(&hd.to_bytes());
    assert_eq!(image.len(), 272);

    let mut dg = DataGroupBlock::default();
    dg.first_cg_addr = 300;
    dg.cg_count = 1;
    dg.data_addr = 786;
    image.extend_from_slice(&dg.to_bytes());
    assert_eq!(image.len(), 300);

    let mut cg = ChannelGroupBlock::default();
    cg.first_ch_addr = 330;
    cg.channel_count = 2;
    cg.record_size = 4;
    cg.cycle_count = 1;
    image.extend_from_slice(&cg.to_bytes());
    assert_eq!(image.len(), 330);

    let mut low = ChannelBlock::default();
    low.short_name = String::from("low");
    low.start_offset = 0;
    low.bit_count = 12;
    low.data_type = DataType::UnsignedIntegerLE;
    low.next_ch_addr = 558;
    image.extend_from_slice(&low.to_bytes());
    assert_eq!(image.len(), 558);

    let mut high = ChannelBlock::default();
    high.short_name = String::from("high");
    high.start_offset = 12;
    high.bit_count = 4;
    high.data_type = DataType::UnsignedIntegerLE;
    image.extend_from_slice(&high.to_bytes());
    assert_eq!(image.len(), 786);

    image.extend_from_slice(&[0x34, 0x0B, 0x00, 0x00]);
    image
}

#[test]
fn hand_assembled_packed_file_decodes() -> Result<()> {
    let mut mdf = Mdf::from_bytes(&packed_file_image())?;
    assert_eq!(mdf.group_count(), 1);
    assert_eq!(mdf.channel_names(), vec!["low", "high"]);

    let options = DecodeOptions::default();
    let low = mdf.get("low", &options)?;
    assert_eq!(low.samples, Samples::UnsignedInteger(vec![0xB34]));
    let high = mdf.get("high", &options)?;
    assert_eq!(high.samples, Samples::UnsignedInteger(vec![0x0]));

    // No master channel: timestamps fall back to record indices
    assert_eq!(low.timestamps, vec![0.0]);
    Ok(())
}

#[test]
fn hand_assembled_file_survives_resave() -> Result<()> {
    let mut mdf = Mdf::from_bytes(&packed_file_image())?;
    let bytes = mdf.to_bytes()?;
    let mut reparsed = Mdf::from_bytes(&bytes)?;
    let low = reparsed.get("low", &DecodeOptions::default())?;
    assert_eq!(low.samples, Samples::UnsignedInteger(vec![0xB34]));
    Ok(())
}

#[test]
fn truncated_image_is_rejected() {
    let image = packed_file_image();
    assert!(matches!(
        Mdf::from_bytes(&image[..100]),
        Err(Error::TooShortBuffer { .. })
    ));
}

#[test]
fn block_id_mismatch_is_detected() {
    let cg = ChannelGroupBlock::default().to_bytes();
    assert!(matches!(
        DataGroupBlock::from_bytes(&cg),
        Err(Error::BlockIDError { .. })
    ));
}

#[test]
fn linear_conversion_block_roundtrip() -> Result<()> {
    let cc = ConversionBlock::linear(-40.0, 0.5);
    let parsed = ConversionBlock::from_bytes(&cc.to_bytes()?)?;
    assert_eq!(parsed.conversion_type, ConversionType::Linear);
    assert_eq!(parsed.convert(100.0), 10.0);
    assert_eq!(parsed.convert(0.0), -40.0);
    Ok(())
}

#[test]
fn formula_conversion_evaluates_after_reparse() -> Result<()> {
    let mut cc = ConversionBlock::identity("");
    cc.conversion_type = ConversionType::Formula;
    cc.formula = Some(String::from("2*X^2 + 1"));
    let parsed = ConversionBlock::from_bytes(&cc.to_bytes()?)?;
    assert_eq!(parsed.conversion_type, ConversionType::Formula);
    assert_eq!(parsed.convert(3.0), 19.0);
    Ok(())
}

#[test]
fn value_to_text_lookup_after_reparse() -> Result<()> {
    let mut cc = ConversionBlock::identity("");
    cc.conversion_type = ConversionType::ValueToText;
    cc.value_texts = vec![(0.0, String::from("off")), (1.0, String::from("on"))];
    let parsed = ConversionBlock::from_bytes(&cc.to_bytes()?)?;
    assert_eq!(parsed.text_for(1.0), Some("on"));
    assert_eq!(parsed.text_for(0.0), Some("off"));
    assert_eq!(parsed.text_for(2.0), None);
    Ok(())
}

#[test]
fn tabular_conversion_interpolates_after_reparse() -> Result<()> {
    let mut cc = ConversionBlock::identity("bar");
    cc.conversion_type = ConversionType::TabularInterp;
    cc.params = vec![0.0, 0.0, 10.0, 100.0];
    let parsed = ConversionBlock::from_bytes(&cc.to_bytes()?)?;
    assert_eq!(parsed.unit, "bar");
    assert_eq!(parsed.convert(5.0), 50.0);
    // Outside the table the edge value holds
    assert_eq!(parsed.convert(20.0), 100.0);
    Ok(())
}

#[test]
fn identification_rejects_mdf4() {
    let mut bytes = IdentificationBlock::default().to_bytes();
    bytes[8..12].copy_from_slice(b"4.10");
    bytes[28..30].copy_from_slice(&410u16.to_le_bytes());
    assert!(matches!(
        IdentificationBlock::from_bytes(&bytes),
        Err(Error::UnsupportedVersion(_))
    ));
}
