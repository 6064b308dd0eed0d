use seq2seq_lex::*;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

#[test]
fn load_vocab_and_lexicon_from_files() -> Result<()> {
    let mut vocab_file = NamedTempFile::new()?;
    writeln!(vocab_file, "<unk>\n<pad>\nlonely\nfine")?;
    let mut lex_file = NamedTempFile::new()?;
    write!(lex_file, r#"{{"lonely": {{"age": 81, "polarity": 1}}, "fine": {{"polarity": 3}}}}"#)?;

    let vocab = Vocab::load(vocab_file.path())?;
    let lexicon = Lexicon::load(lex_file.path())?;
    assert_eq!(vocab.len(), 4);
    assert_eq!(lexicon.len(), 2);

    let ids = ndarray::array![[2usize, 3, 1]];
    let feats = lex_features(ids.view(), &vocab, &lexicon)?;
    let flat: Vec<f32> = feats.iter().copied().collect();
    assert_eq!(flat, vec![81.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    Ok(())
}

#[test]
fn aux_and_target_fields_together() -> Result<()> {
    let mut lexicon = Lexicon::new();
    lexicon.insert("tired", LexEntry { age: Some(45.0), polarity: Some(Polarity::Negative) });

    let lower = FieldOptions { lower: true, batch_first: Some(false), ..Default::default() };
    let mut src = AuxSourceField::new(Arc::new(lexicon), lower.clone());
    let mut tgt = TargetField::new(lower);

    let src_examples = vec![src.preprocess("So TIRED"), src.preprocess("fine")];
    let tgt_examples = vec![tgt.preprocess("Rest now"), tgt.preprocess("good")];
    assert!(tgt_examples.iter().all(|ex| ex.first().map(String::as_str) == Some(TargetField::SYM_SOS)
        && ex.last().map(String::as_str) == Some(TargetField::SYM_EOS)));

    src.build_vocab(&src_examples, &VocabOptions::default());
    tgt.build_vocab(&tgt_examples, &VocabOptions::default());

    let batch = src.process(&src_examples)?;
    assert_eq!(batch.lengths, vec![2, 1]);
    let feats = src.lex_features(batch.ids.view())?;
    assert_eq!(feats.shape(), &[2, 2, LEX_DIM]);
    assert_eq!(feats[[0, 1, 0]], 45.0);
    assert_eq!(feats[[0, 1, 1]], 1.0);
    assert!(feats.slice(ndarray::s![1, .., ..]).iter().all(|&v| v == 0.0));

    let tgt_batch = tgt.process(&tgt_examples)?;
    assert_eq!(tgt_batch.lengths, vec![4, 3]);
    assert_eq!(tgt_batch.ids[[0, 0]], tgt.sos_id().unwrap());
    assert_eq!(tgt_batch.ids[[1, 2]], tgt.eos_id().unwrap());
    Ok(())
}

#[test]
fn blank_vocab_line_keeps_its_index() -> Result<()> {
    let mut vocab_file = NamedTempFile::new()?;
    write!(vocab_file, "<unk>\n\nhello\n")?;

    let vocab = Vocab::load(vocab_file.path())?;
    assert_eq!(vocab.len(), 3);
    assert_eq!(vocab.get("hello"), Some(2));
    assert_eq!(vocab.itos(1)?, "");
    Ok(())
}
