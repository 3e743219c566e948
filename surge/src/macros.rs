macro_rules! cfg_alerts {
    ($($item:item)*) => {
        $(
            #[cfg(feature = "alerts")]
            #[cfg_attr(docsrs, doc(cfg(feature = "alerts")))]
            $item
        )*
    }
}
