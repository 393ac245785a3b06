//! The operator registry: a fixed table from mnemonic to opcode and
//! expected operand count, built once and read-only afterwards.
//!
//! Surplus operands are ignored by the dispatcher (handlers read the
//! operands nearest the operator); missing operands surface as
//! `MissingOperand`. A `None` arity marks the color operators whose
//! operand count depends on the active color space.

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpCode {
    // general graphics state
    SetLineWidth,
    SetLineCap,
    SetLineJoin,
    SetMiterLimit,
    SetDash,
    SetRenderingIntent,
    SetFlatness,
    SetExtGState,
    // special graphics state
    Save,
    Restore,
    Concat,
    // path construction
    MoveTo,
    LineTo,
    CurveTo,
    CurveToReplicateInitial,
    CurveToReplicateFinal,
    Rect,
    ClosePath,
    // path painting
    Stroke,
    CloseStroke,
    Fill,
    FillCompat,
    FillEvenOdd,
    FillStroke,
    FillStrokeEvenOdd,
    CloseFillStroke,
    CloseFillStrokeEvenOdd,
    EndPath,
    // clipping
    Clip,
    ClipEvenOdd,
    // text objects
    BeginText,
    EndText,
    // text state
    SetCharSpacing,
    SetWordSpacing,
    SetHorizScaling,
    SetLeading,
    SetFont,
    SetRenderMode,
    SetRise,
    // text positioning
    TextMove,
    TextMoveSetLeading,
    SetTextMatrix,
    TextNextLine,
    // text showing
    ShowText,
    ShowTextAdjusted,
    MoveShowText,
    SpacingMoveShowText,
    // color
    SetStrokeColorSpace,
    SetFillColorSpace,
    SetStrokeColor,
    SetStrokeColorN,
    SetFillColor,
    SetFillColorN,
    SetStrokeGray,
    SetFillGray,
    SetStrokeRgb,
    SetFillRgb,
    SetStrokeCmyk,
    SetFillCmyk,
    // shading
    ShadingFill,
    // inline images
    BeginInlineImage,
    InlineImageData,
    EndInlineImage,
    // XObjects
    Invoke,
    // marked content
    MarkPoint,
    MarkPointProps,
    BeginMarkedContent,
    BeginMarkedContentProps,
    EndMarkedContent,
    // compatibility
    BeginCompat,
    EndCompat,
    // Type 3 glyph metrics
    SetCharWidth,
    SetCacheDevice,
}

pub struct OpInfo {
    pub code: OpCode,
    /// `None`: operand count depends on the color space.
    pub arity: Option<u8>,
}

macro_rules! table {
    ($($mnemonic:literal => $code:ident / $arity:expr,)*) => {
        [ $( ($mnemonic, OpInfo { code: OpCode::$code, arity: $arity }), )* ]
    };
}

static OPERATORS: Lazy<HashMap<&'static str, OpInfo>> = Lazy::new(|| {
    HashMap::from(table![
        "w" => SetLineWidth / Some(1),
        "J" => SetLineCap / Some(1),
        "j" => SetLineJoin / Some(1),
        "M" => SetMiterLimit / Some(1),
        "d" => SetDash / Some(2),
        "ri" => SetRenderingIntent / Some(1),
        "i" => SetFlatness / Some(1),
        "gs" => SetExtGState / Some(1),
        "q" => Save / Some(0),
        "Q" => Restore / Some(0),
        "cm" => Concat / Some(6),
        "m" => MoveTo / Some(2),
        "l" => LineTo / Some(2),
        "c" => CurveTo / Some(6),
        "v" => CurveToReplicateInitial / Some(4),
        "y" => CurveToReplicateFinal / Some(4),
        "re" => Rect / Some(4),
        "h" => ClosePath / Some(0),
        "S" => Stroke / Some(0),
        "s" => CloseStroke / Some(0),
        "f" => Fill / Some(0),
        "F" => FillCompat / Some(0),
        "f*" => FillEvenOdd / Some(0),
        "B" => FillStroke / Some(0),
        "B*" => FillStrokeEvenOdd / Some(0),
        "b" => CloseFillStroke / Some(0),
        "b*" => CloseFillStrokeEvenOdd / Some(0),
        "n" => EndPath / Some(0),
        "W" => Clip / Some(0),
        "W*" => ClipEvenOdd / Some(0),
        "BT" => BeginText / Some(0),
        "ET" => EndText / Some(0),
        "Tc" => SetCharSpacing / Some(1),
        "Tw" => SetWordSpacing / Some(1),
        "Tz" => SetHorizScaling / Some(1),
        "TL" => SetLeading / Some(1),
        "Tf" => SetFont / Some(2),
        "Tr" => SetRenderMode / Some(1),
        "Ts" => SetRise / Some(1),
        "Td" => TextMove / Some(2),
        "TD" => TextMoveSetLeading / Some(2),
        "Tm" => SetTextMatrix / Some(6),
        "T*" => TextNextLine / Some(0),
        "Tj" => ShowText / Some(1),
        "TJ" => ShowTextAdjusted / Some(1),
        "'" => MoveShowText / Some(1),
        "\"" => SpacingMoveShowText / Some(3),
        "CS" => SetStrokeColorSpace / Some(1),
        "cs" => SetFillColorSpace / Some(1),
        "SC" => SetStrokeColor / None,
        "SCN" => SetStrokeColorN / None,
        "sc" => SetFillColor / None,
        "scn" => SetFillColorN / None,
        "G" => SetStrokeGray / Some(1),
        "g" => SetFillGray / Some(1),
        "RG" => SetStrokeRgb / Some(3),
        "rg" => SetFillRgb / Some(3),
        "K" => SetStrokeCmyk / Some(4),
        "k" => SetFillCmyk / Some(4),
        "sh" => ShadingFill / Some(1),
        "BI" => BeginInlineImage / Some(0),
        "ID" => InlineImageData / None,
        "EI" => EndInlineImage / Some(0),
        "Do" => Invoke / Some(1),
        "MP" => MarkPoint / Some(1),
        "DP" => MarkPointProps / Some(2),
        "BMC" => BeginMarkedContent / Some(1),
        "BDC" => BeginMarkedContentProps / Some(2),
        "EMC" => EndMarkedContent / Some(0),
        "BX" => BeginCompat / Some(0),
        "EX" => EndCompat / Some(0),
        "d0" => SetCharWidth / Some(2),
        "d1" => SetCacheDevice / Some(6),
    ])
});

pub fn lookup(mnemonic: &str) -> Option<&'static OpInfo> {
    OPERATORS.get(mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_operator_families() {
        assert_eq!(lookup("q").unwrap().code, OpCode::Save);
        assert_eq!(lookup("f*").unwrap().code, OpCode::FillEvenOdd);
        assert_eq!(lookup("\"").unwrap().code, OpCode::SpacingMoveShowText);
        assert!(lookup("nope").is_none());
        assert!(OPERATORS.len() > 70);
    }

    #[test]
    fn variable_arity_only_for_color_and_image_data() {
        for (m, info) in OPERATORS.iter() {
            if info.arity.is_none() {
                assert!(
                    matches!(*m, "SC" | "SCN" | "sc" | "scn" | "ID"),
                    "unexpected variable arity for {}",
                    m
                );
            }
        }
    }
}
